//! Top-level crate for tagmetrics.
//!
//! Re-exports the core types and the facade library so users can depend on a single crate.

pub mod core {
    pub use tagmetrics_core::*;
}

pub mod facade {
    pub use tagmetrics_facade::*;
}

pub use tagmetrics_core::{TagContext, TagExtractor, TagSet};
pub use tagmetrics_facade::{Metrics, MetricsConfig, Registry};
