use std::sync::Arc;

use tagmetrics_core::backend::GaugeHandle;
use tagmetrics_core::error::ErrorSink;
use tagmetrics_core::tags::TagSet;

use super::{tag_aware, TagBinding};
use crate::registry::RegisteredInstrument;

/// Gauge with bound tags.
#[derive(Clone)]
pub struct TaggedGauge {
    handle: Arc<dyn GaugeHandle>,
    binding: TagBinding,
}

impl TaggedGauge {
    pub(crate) fn new(
        registered: RegisteredInstrument<dyn GaugeHandle>,
        tags: TagSet,
        sink: ErrorSink,
    ) -> Self {
        Self {
            handle: registered.handle,
            binding: TagBinding::new(tags, registered.label_keys, sink),
        }
    }

    pub fn set(&self, value: f64) {
        self.binding.record(|values| self.handle.set(value, values));
    }

    pub fn add(&self, delta: f64) {
        self.binding.record(|values| self.handle.add(delta, values));
    }

    pub fn inc(&self) {
        self.add(1.0);
    }

    pub fn dec(&self) {
        self.add(-1.0);
    }
}

tag_aware!(TaggedGauge);
