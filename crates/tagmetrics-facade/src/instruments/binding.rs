use std::collections::BTreeMap;
use std::sync::Arc;

use tagmetrics_core::backend::guarded;
use tagmetrics_core::error::{ErrorSink, Result};
use tagmetrics_core::tags::{TagContext, TagSet};

/// Tag state shared by every wrapper kind.
///
/// Holds the bound tags, the request context extractors read from, the label
/// keys of the registered instrument, and the sink for observation errors.
/// All fields are cheap to clone; deriving a new binding never touches the old
/// one.
#[derive(Clone)]
pub(crate) struct TagBinding {
    tags: TagSet,
    context: Arc<TagContext>,
    label_keys: Arc<[String]>,
    sink: ErrorSink,
}

impl TagBinding {
    pub(crate) fn new(tags: TagSet, label_keys: Arc<[String]>, sink: ErrorSink) -> Self {
        Self {
            tags,
            context: Arc::new(TagContext::new()),
            label_keys,
            sink,
        }
    }

    pub(crate) fn label_keys(&self) -> &[String] {
        &self.label_keys
    }

    pub(crate) fn with_tags(&self, tags: &TagSet) -> Self {
        let unregistered: Vec<String> = tags
            .keys()
            .into_iter()
            .filter(|k| !self.label_keys.contains(k))
            .collect();
        if !unregistered.is_empty() {
            tracing::debug!(
                keys = ?unregistered,
                registered = ?self.label_keys,
                "tags outside the registered label keys are not recorded"
            );
        }
        Self {
            tags: self.tags.merge(tags),
            ..self.clone()
        }
    }

    pub(crate) fn with_context(&self, context: TagContext) -> Self {
        Self {
            context: Arc::new(context),
            ..self.clone()
        }
    }

    /// Every bound tag, resolved against the bound context.
    pub(crate) fn resolve(&self) -> BTreeMap<String, String> {
        self.tags.resolve(&self.context)
    }

    /// Values for the registered label keys, in registration order.
    fn label_values(&self) -> Vec<String> {
        self.tags.resolve_values(&self.label_keys, &self.context)
    }

    /// Hand the label values to `op` and route any failure, a backend panic
    /// included, to the sink.
    pub(crate) fn record(&self, op: impl FnOnce(&[String]) -> Result<()>) {
        let values = self.label_values();
        if let Err(e) = guarded(|| op(&values)) {
            (self.sink)(&e);
        }
    }
}
