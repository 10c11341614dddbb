use std::sync::Arc;

use tagmetrics_core::backend::HistogramHandle;
use tagmetrics_core::error::ErrorSink;
use tagmetrics_core::tags::TagSet;

use super::{tag_aware, TagBinding};
use crate::registry::RegisteredInstrument;

/// Histogram with bound tags.
#[derive(Clone)]
pub struct TaggedHistogram {
    handle: Arc<dyn HistogramHandle>,
    binding: TagBinding,
}

impl TaggedHistogram {
    pub(crate) fn new(
        registered: RegisteredInstrument<dyn HistogramHandle>,
        tags: TagSet,
        sink: ErrorSink,
    ) -> Self {
        Self {
            handle: registered.handle,
            binding: TagBinding::new(tags, registered.label_keys, sink),
        }
    }

    pub fn observe(&self, value: f64) {
        self.binding.record(|values| self.handle.observe(value, values));
    }
}

tag_aware!(TaggedHistogram);
