//! tagmetrics facade library entry.
//!
//! Wires the instrument registry, tag-aware wrappers, no-op fallbacks and the
//! facade on top of the backend contract from `tagmetrics-core`. Also ships a
//! strict YAML settings loader and an in-process reference backend.
//!
//! Instrumentation calls never return errors and never panic; failures are
//! routed to the configured error sink.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod facade;
pub mod instruments;
pub mod noop;
pub mod obs;
pub mod registry;

pub use config::{MetricsConfig, MetricsSettings};
pub use facade::Metrics;
pub use instruments::{TaggedCounter, TaggedGauge, TaggedHistogram, TaggedTimer, TimerScope};
pub use registry::{Registry, RegistryOptions};
