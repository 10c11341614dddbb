//! Facade configuration.
//!
//! Two layers: [`MetricsSettings`] is the static, YAML-loadable part (strict
//! parsing, validated on load). [`MetricsConfig`] is what the facade consumes
//! at runtime and adds the pieces that cannot live in a file: tag extractors
//! and the error sink.

pub mod schema;

use std::fs;
use std::sync::Arc;

use tagmetrics_core::error::{log_error_sink, ErrorSink, MetricsError, Result};
use tagmetrics_core::tags::{TagExtractor, TagSet};

use crate::registry::RegistryOptions;

pub use schema::{LabelConflict, MetricsSettings, DEFAULT_TIMER_BUCKETS};

pub fn load_from_file(path: &str) -> Result<MetricsSettings> {
    let s = fs::read_to_string(path)
        .map_err(|e| MetricsError::BadConfig(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<MetricsSettings> {
    let cfg: MetricsSettings = serde_yaml::from_str(s)
        .map_err(|e| MetricsError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

impl From<&MetricsSettings> for RegistryOptions {
    fn from(s: &MetricsSettings) -> Self {
        Self {
            timer_buckets: s.timer_buckets.clone(),
            label_conflict: s.label_conflict,
        }
    }
}

/// Runtime configuration consumed by [`crate::Metrics`].
///
/// Defaults: no tags, no extractors, errors logged at `warn`.
#[derive(Clone)]
pub struct MetricsConfig {
    /// Initial facade tags.
    pub tags: TagSet,
    /// Well-known tag keys with default extractors. Explicit `tags` override
    /// them key by key.
    pub extractors: TagSet,
    pub on_error: ErrorSink,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            tags: TagSet::new(),
            extractors: TagSet::new(),
            on_error: log_error_sink(),
        }
    }
}

impl MetricsConfig {
    /// Static tags from settings become constant extractors.
    pub fn from_settings(settings: &MetricsSettings) -> Self {
        Self {
            tags: settings.tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagExtractor>) -> Self {
        self.tags.insert(key, value);
        self
    }

    pub fn with_extractor(
        mut self,
        key: impl Into<String>,
        extractor: impl Into<TagExtractor>,
    ) -> Self {
        self.extractors.insert(key, extractor);
        self
    }

    pub fn with_error_sink<F>(mut self, sink: F) -> Self
    where
        F: Fn(&MetricsError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(sink);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.extractors.validate()?;
        self.tags.validate()
    }

    /// Facade tag set at construction: extractors overridden by tags.
    pub(crate) fn initial_tags(&self) -> TagSet {
        self.extractors.merge(&self.tags)
    }
}
