//! Shared error types across tagmetrics crates.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Instrument kinds known to the registry and backends.
///
/// A timer is registered as a [`InstrumentKind::Histogram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    Counter,
    Gauge,
    Histogram,
}

impl InstrumentKind {
    /// String representation used in logs and the text exposition.
    pub fn as_str(self) -> &'static str {
        match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::Gauge => "gauge",
            InstrumentKind::Histogram => "histogram",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Unified error type used by the registry, backends and configuration.
///
/// Cloneable because the registry caches registration failures and hands the
/// same error to every caller and every no-op invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("invalid metric name: {0:?}")]
    InvalidName(String),
    #[error("invalid label key {key:?} for metric {name}")]
    InvalidLabel { name: String, key: String },
    #[error("invalid buckets for {name}: {reason}")]
    InvalidBuckets { name: String, reason: String },
    #[error("metric {0} already registered")]
    AlreadyRegistered(String),
    #[error("metric {name} registered as {registered}, requested as {requested}")]
    KindMismatch {
        name: String,
        registered: InstrumentKind,
        requested: InstrumentKind,
    },
    #[error("metric {name} registered with labels [{registered}], requested with [{requested}]")]
    LabelConflict {
        name: String,
        registered: String,
        requested: String,
    },
    #[error("metric {name} expects {expected} label values, got {got}")]
    LabelCardinality {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("invalid observation for {name}: {reason}")]
    InvalidObservation { name: String, reason: String },
    #[error("backend: {0}")]
    Backend(String),
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
}

/// Failure of a single tag extractor. Never escapes tag resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractorError {
    #[error("context has no value for {0:?}")]
    MissingContext(String),
    #[error("extractor failed: {0}")]
    Failed(String),
}

/// Process-wide error callback.
///
/// Invoked when a registration fails, when a no-op instrument is used, and
/// when a backend rejects an observation. Must not block.
pub type ErrorSink = Arc<dyn Fn(&MetricsError) + Send + Sync>;

/// Default sink: log at `warn` and carry on.
pub fn log_error_sink() -> ErrorSink {
    Arc::new(|err: &MetricsError| {
        tracing::warn!(error = %err, "metrics error");
    })
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_owned())
}
