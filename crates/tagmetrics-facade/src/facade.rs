//! Entry point applications use to obtain tagged instruments.

use std::sync::Arc;

use tagmetrics_core::backend::{CounterHandle, GaugeHandle, HistogramHandle};
use tagmetrics_core::error::{ErrorSink, MetricsError, Result};
use tagmetrics_core::tags::TagSet;

use crate::config::MetricsConfig;
use crate::instruments::{TaggedCounter, TaggedGauge, TaggedHistogram, TaggedTimer};
use crate::noop::NoopInstrument;
use crate::registry::{RegisteredInstrument, Registry};

/// Tag-aware metrics facade.
///
/// Every constructor registers (or reuses) the named instrument with the
/// label keys of the facade's current tag set and binds that tag set to the
/// returned wrapper. Constructors never fail: a registration error is sent to
/// the error sink and the caller gets a wrapper over a [`NoopInstrument`].
///
/// # Sharing
/// [`Metrics::with_tags`] mutates the facade in place and needs `&mut self`,
/// so a facade shared behind an `Arc` cannot be retagged. For per-request tags
/// either clone the facade (cheap) or derive wrappers with the non-mutating
/// `with_tags`/`with_context` on the instruments.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    tags: TagSet,
    on_error: ErrorSink,
}

impl Metrics {
    /// Validates `config` before building the facade.
    pub fn new(registry: Arc<Registry>, config: MetricsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            tags: config.initial_tags(),
            on_error: config.on_error,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Merge `tags` into the facade's own tag set, in place, and return the
    /// facade for chaining. Instruments created earlier keep their tags;
    /// instruments created afterwards register and bind the merged set.
    ///
    /// Unlike the wrapper-level `with_tags`, this mutates `self`.
    pub fn with_tags(&mut self, tags: TagSet) -> &mut Self {
        self.tags.extend(&tags);
        self
    }

    pub fn counter(&self, name: &str, description: &str) -> TaggedCounter {
        let keys = self.tags.keys();
        let registered: RegisteredInstrument<dyn CounterHandle> =
            match self.registry.load_or_store_counter(name, description, &keys) {
                Ok(registered) => registered,
                Err(err) => {
                    let handle: Arc<dyn CounterHandle> = self.noop(name, err);
                    RegisteredInstrument { handle, label_keys: keys.into() }
                }
            };
        TaggedCounter::new(registered, self.tags.clone(), self.on_error.clone())
    }

    pub fn gauge(&self, name: &str, description: &str) -> TaggedGauge {
        let keys = self.tags.keys();
        let registered: RegisteredInstrument<dyn GaugeHandle> =
            match self.registry.load_or_store_gauge(name, description, &keys) {
                Ok(registered) => registered,
                Err(err) => {
                    let handle: Arc<dyn GaugeHandle> = self.noop(name, err);
                    RegisteredInstrument { handle, label_keys: keys.into() }
                }
            };
        TaggedGauge::new(registered, self.tags.clone(), self.on_error.clone())
    }

    pub fn histogram(&self, name: &str, description: &str, buckets: &[f64]) -> TaggedHistogram {
        let keys = self.tags.keys();
        let registered: RegisteredInstrument<dyn HistogramHandle> =
            match self.registry.load_or_store_histogram(name, description, buckets, &keys) {
                Ok(registered) => registered,
                Err(err) => {
                    let handle: Arc<dyn HistogramHandle> = self.noop(name, err);
                    RegisteredInstrument { handle, label_keys: keys.into() }
                }
            };
        TaggedHistogram::new(registered, self.tags.clone(), self.on_error.clone())
    }

    /// `None` or empty buckets select the registry's timer ladder.
    pub fn timer(&self, name: &str, description: &str, buckets: Option<&[f64]>) -> TaggedTimer {
        let keys = self.tags.keys();
        let registered: RegisteredInstrument<dyn HistogramHandle> =
            match self.registry.load_or_store_timer(name, description, buckets, &keys) {
                Ok(registered) => registered,
                Err(err) => {
                    let handle: Arc<dyn HistogramHandle> = self.noop(name, err);
                    RegisteredInstrument { handle, label_keys: keys.into() }
                }
            };
        TaggedTimer::new(registered, self.tags.clone(), self.on_error.clone())
    }

    /// Report `err` once and build the stand-in handle.
    fn noop(&self, name: &str, err: MetricsError) -> Arc<NoopInstrument> {
        tracing::debug!(name = %name, error = %err, "using no-op instrument");
        (self.on_error)(&err);
        Arc::new(NoopInstrument::new(err, self.on_error.clone()))
    }
}
