//! Contract with the underlying metrics backend.
//!
//! The facade never stores or exports samples itself. It asks a
//! [`MetricsBackend`] to create instruments and forwards observations to the
//! returned handles. Label values are always passed in the order of the label
//! keys supplied at creation.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{panic_message, MetricsError, Result};

pub trait CounterHandle: Send + Sync {
    fn inc(&self, label_values: &[String]) -> Result<()> {
        self.add(1.0, label_values)
    }

    fn add(&self, value: f64, label_values: &[String]) -> Result<()>;
}

pub trait GaugeHandle: Send + Sync {
    fn set(&self, value: f64, label_values: &[String]) -> Result<()>;

    fn add(&self, delta: f64, label_values: &[String]) -> Result<()>;
}

pub trait HistogramHandle: Send + Sync {
    fn observe(&self, value: f64, label_values: &[String]) -> Result<()>;
}

/// Instrument factory implemented by a concrete backend.
///
/// Backends are expected to reject a second registration of the same name;
/// the registry guarantees they never see one.
pub trait MetricsBackend: Send + Sync {
    fn create_counter(
        &self,
        name: &str,
        description: &str,
        label_keys: &[String],
    ) -> Result<Arc<dyn CounterHandle>>;

    fn create_gauge(
        &self,
        name: &str,
        description: &str,
        label_keys: &[String],
    ) -> Result<Arc<dyn GaugeHandle>>;

    fn create_histogram(
        &self,
        name: &str,
        description: &str,
        buckets: &[f64],
        label_keys: &[String],
    ) -> Result<Arc<dyn HistogramHandle>>;
}

/// Run a backend call, turning a panic into [`MetricsError::Backend`].
///
/// Backends are third-party code; some panic on duplicate registration or
/// bad input. Every call the facade makes into a backend goes through here so
/// that no unwind reaches an instrumentation call site.
pub fn guarded<T>(call: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(res) => res,
        Err(payload) => Err(MetricsError::Backend(format!(
            "backend panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

/// Metric names follow the Prometheus rules: `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn validate_metric_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let head_ok = matches!(
        chars.next(),
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':'
    );
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':');
    if !head_ok || !tail_ok {
        return Err(MetricsError::InvalidName(name.to_owned()));
    }
    Ok(())
}

/// Bucket upper bounds must be non-empty, finite and strictly ascending.
pub fn validate_buckets(name: &str, buckets: &[f64]) -> Result<()> {
    let invalid = |reason: &str| MetricsError::InvalidBuckets {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    if buckets.is_empty() {
        return Err(invalid("no buckets"));
    }
    if buckets.iter().any(|b| !b.is_finite()) {
        return Err(invalid("non-finite bound"));
    }
    if buckets.windows(2).any(|w| w[0] >= w[1]) {
        return Err(invalid("bounds must be strictly ascending"));
    }
    Ok(())
}
