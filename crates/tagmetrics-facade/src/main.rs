//! tagmetrics demo
//!
//! Loads `tagmetrics.yaml` if present, records a few tagged observations on the
//! in-memory backend, and prints the text exposition.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tagmetrics_core::tags::{TagContext, TagExtractor, TagSet};
use tagmetrics_facade::obs::{self, memory::MemoryBackend};
use tagmetrics_facade::{
    config, Metrics, MetricsConfig, MetricsSettings, Registry, RegistryOptions,
};

const CONFIG_PATH: &str = "tagmetrics.yaml";

fn main() -> tagmetrics_core::Result<()> {
    obs::init_tracing();

    let settings = if Path::new(CONFIG_PATH).exists() {
        config::load_from_file(CONFIG_PATH)?
    } else {
        tracing::info!(path = CONFIG_PATH, "config not found, using defaults");
        MetricsSettings::default()
    };

    let backend = Arc::new(MemoryBackend::new());
    let registry = Arc::new(Registry::with_options(
        backend.clone(),
        RegistryOptions::from(&settings),
    ));

    let cfg = MetricsConfig::from_settings(&settings)
        .with_extractor("tenant", TagExtractor::from_context("tenant"));
    let mut metrics = Metrics::new(registry, cfg)?;
    metrics.with_tags(TagSet::new().with("route", "/checkout"));

    let requests = metrics.counter("demo_requests_total", "Requests handled");
    let in_flight = metrics.gauge("demo_in_flight", "Requests in flight");
    let latency = metrics.timer("demo_request_duration_seconds", "Request latency", None);

    for tenant in ["acme", "globex", "acme"] {
        let ctx = TagContext::new().with("tenant", tenant);
        let scope = latency.with_context(ctx.clone()).start();
        in_flight.with_context(ctx.clone()).inc();
        requests.with_context(ctx.clone()).inc();
        std::thread::sleep(Duration::from_millis(3));
        in_flight.with_context(ctx).dec();
        let elapsed = scope.stop();
        tracing::info!(tenant, ?elapsed, "request recorded");
    }

    print!("{}", backend.render());
    Ok(())
}
