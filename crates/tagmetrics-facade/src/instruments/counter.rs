use std::sync::Arc;

use tagmetrics_core::backend::CounterHandle;
use tagmetrics_core::error::ErrorSink;
use tagmetrics_core::tags::TagSet;

use super::{tag_aware, TagBinding};
use crate::registry::RegisteredInstrument;

/// Monotonic counter with bound tags.
#[derive(Clone)]
pub struct TaggedCounter {
    handle: Arc<dyn CounterHandle>,
    binding: TagBinding,
}

impl TaggedCounter {
    pub(crate) fn new(
        registered: RegisteredInstrument<dyn CounterHandle>,
        tags: TagSet,
        sink: ErrorSink,
    ) -> Self {
        Self {
            handle: registered.handle,
            binding: TagBinding::new(tags, registered.label_keys, sink),
        }
    }

    pub fn inc(&self) {
        self.binding.record(|values| self.handle.inc(values));
    }

    pub fn add(&self, value: f64) {
        self.binding.record(|values| self.handle.add(value, values));
    }
}

tag_aware!(TaggedCounter);
