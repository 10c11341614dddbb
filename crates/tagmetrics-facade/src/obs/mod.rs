//! Observability plumbing: tracing setup and the in-process reference backend.

pub mod memory;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}
