//! tagmetrics core: tag store, backend contract, and error types.
//!
//! This crate defines the pieces shared by the facade and by backend
//! implementations. It carries no registry or runtime state so a backend can
//! depend on it without pulling in the facade.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Instrumentation must never take the host process down, so every fallible
//! path surfaces as `MetricsError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod backend;
pub mod error;
pub mod tags;

/// Shared result type.
pub use error::{ErrorSink, ExtractorError, InstrumentKind, MetricsError, Result};
pub use tags::{TagContext, TagExtractor, TagSet};
