use std::collections::BTreeMap;

use serde::Deserialize;
use tagmetrics_core::backend::validate_buckets;
use tagmetrics_core::error::{MetricsError, Result};
use tagmetrics_core::tags::validate_label_key;

/// Classic sub-second latency ladder, in seconds.
pub const DEFAULT_TIMER_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// What the registry does when a name is re-requested with different label
/// keys or buckets than its first registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelConflict {
    /// Log a warning and hand back the first registration. Tag keys the first
    /// registration did not declare are dropped from observations.
    #[default]
    Reuse,
    /// Fail the request; the caller gets a no-op instrument.
    Reject,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSettings {
    pub version: u32,

    /// Static tags bound to every instrument created by the facade.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    #[serde(default = "default_timer_buckets")]
    pub timer_buckets: Vec<f64>,

    #[serde(default)]
    pub label_conflict: LabelConflict,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            version: 1,
            tags: BTreeMap::new(),
            timer_buckets: default_timer_buckets(),
            label_conflict: LabelConflict::default(),
        }
    }
}

impl MetricsSettings {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MetricsError::UnsupportedVersion);
        }
        for key in self.tags.keys() {
            validate_label_key(key)?;
        }
        validate_buckets("timer_buckets", &self.timer_buckets)
            .map_err(|e| MetricsError::BadConfig(e.to_string()))?;
        if self.timer_buckets.iter().any(|b| *b <= 0.0) {
            return Err(MetricsError::BadConfig(
                "timer_buckets must be positive durations in seconds".into(),
            ));
        }
        Ok(())
    }
}

fn default_timer_buckets() -> Vec<f64> {
    DEFAULT_TIMER_BUCKETS.to_vec()
}
