//! Stand-in instruments for failed registrations.
//!
//! A [`NoopInstrument`] records nothing. Every operation hands the original
//! registration error to the error sink, so the failure stays visible in logs
//! while call sites never have to check a result.

use tagmetrics_core::backend::{CounterHandle, GaugeHandle, HistogramHandle};
use tagmetrics_core::error::{ErrorSink, MetricsError, Result};

pub struct NoopInstrument {
    error: MetricsError,
    sink: ErrorSink,
}

impl NoopInstrument {
    pub fn new(error: MetricsError, sink: ErrorSink) -> Self {
        Self { error, sink }
    }

    pub fn error(&self) -> &MetricsError {
        &self.error
    }

    fn report(&self) -> Result<()> {
        (self.sink)(&self.error);
        Ok(())
    }
}

impl CounterHandle for NoopInstrument {
    fn inc(&self, _: &[String]) -> Result<()> {
        self.report()
    }

    fn add(&self, _: f64, _: &[String]) -> Result<()> {
        self.report()
    }
}

impl GaugeHandle for NoopInstrument {
    fn set(&self, _: f64, _: &[String]) -> Result<()> {
        self.report()
    }

    fn add(&self, _: f64, _: &[String]) -> Result<()> {
        self.report()
    }
}

impl HistogramHandle for NoopInstrument {
    fn observe(&self, _: f64, _: &[String]) -> Result<()> {
        self.report()
    }
}
