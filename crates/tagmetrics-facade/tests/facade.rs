#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tagmetrics_core::backend::{CounterHandle, GaugeHandle, HistogramHandle, MetricsBackend};
use tagmetrics_core::error::{MetricsError, Result};
use tagmetrics_core::tags::{TagContext, TagExtractor, TagSet};
use tagmetrics_facade::config::{LabelConflict, DEFAULT_TIMER_BUCKETS};
use tagmetrics_facade::obs::memory::MemoryBackend;
use tagmetrics_facade::{Metrics, MetricsConfig, Registry, RegistryOptions};

use fake_backend::{collecting_sink, FakeBackend};

fn facade(backend: Arc<FakeBackend>, cfg: MetricsConfig) -> Metrics {
    let registry = Arc::new(Registry::new(backend));
    Metrics::new(registry, cfg).unwrap()
}

/// Panics on counter creation and on every gauge observation.
struct PanickingBackend;

struct PanickingGauge;

impl GaugeHandle for PanickingGauge {
    fn set(&self, _: f64, _: &[String]) -> Result<()> {
        panic!("gauge exploded");
    }

    fn add(&self, _: f64, _: &[String]) -> Result<()> {
        panic!("gauge exploded");
    }
}

impl MetricsBackend for PanickingBackend {
    fn create_counter(
        &self,
        name: &str,
        _: &str,
        _: &[String],
    ) -> Result<Arc<dyn CounterHandle>> {
        panic!("{name} already registered");
    }

    fn create_gauge(&self, _: &str, _: &str, _: &[String]) -> Result<Arc<dyn GaugeHandle>> {
        Ok(Arc::new(PanickingGauge))
    }

    fn create_histogram(
        &self,
        _: &str,
        _: &str,
        _: &[f64],
        _: &[String],
    ) -> Result<Arc<dyn HistogramHandle>> {
        Err(MetricsError::Backend("histograms disabled".into()))
    }
}

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

#[test]
fn repeated_requests_create_one_backend_instrument() {
    let backend = Arc::new(FakeBackend::default());
    let metrics = facade(backend.clone(), MetricsConfig::default().with_tag("svc", "api"));

    for _ in 0..5 {
        metrics.counter("x", "d").inc();
    }

    assert_eq!(backend.counters(), 1);
    let obs = backend.observations();
    assert_eq!(obs.len(), 5);
    assert!(obs.iter().all(|o| o.name == "x" && o.label("svc") == Some("api")));
}

#[test]
fn failed_gauge_degrades_to_noop_and_reports_each_call() {
    let backend = Arc::new(FakeBackend {
        fail_gauges: true,
        ..FakeBackend::default()
    });
    let (seen, sink) = collecting_sink();
    let metrics = facade(backend.clone(), MetricsConfig::default().with_error_sink(sink));

    let gauge = metrics.gauge("g", "d");
    let original = MetricsError::Backend("gauges disabled".into());
    assert_eq!(*seen.lock().unwrap(), vec![original.clone()]);

    gauge.set(5.0);
    assert_eq!(seen.lock().unwrap().len(), 2);
    gauge.set(6.0);
    gauge.add(1.0);
    assert_eq!(seen.lock().unwrap().len(), 4);
    assert!(seen.lock().unwrap().iter().all(|e| *e == original));
    assert!(backend.observations().is_empty());
}

#[test]
fn failed_registration_is_cached() {
    let backend = Arc::new(FakeBackend {
        fail_counters: true,
        ..FakeBackend::default()
    });
    let (seen, sink) = collecting_sink();
    let metrics = facade(backend.clone(), MetricsConfig::default().with_error_sink(sink));

    metrics.counter("c", "d");
    metrics.counter("c", "d");

    assert_eq!(backend.counters(), 1);
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[test]
fn timer_without_buckets_uses_default_ladder() {
    let backend = Arc::new(FakeBackend::default());
    let metrics = facade(backend.clone(), MetricsConfig::default());

    metrics.timer("t", "d", None);

    let buckets = backend.histogram_buckets.lock().unwrap().clone();
    assert_eq!(
        buckets,
        vec![(
            "t".to_owned(),
            vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
        )]
    );
    assert_eq!(buckets[0].1, DEFAULT_TIMER_BUCKETS);
}

#[test]
fn histogram_keeps_caller_buckets() {
    let backend = Arc::new(FakeBackend::default());
    let metrics = facade(backend.clone(), MetricsConfig::default());

    let h = metrics.histogram("payload_bytes", "d", &[64.0, 512.0, 4096.0]);
    h.observe(100.0);

    let buckets = backend.histogram_buckets.lock().unwrap().clone();
    assert_eq!(buckets[0].1, vec![64.0, 512.0, 4096.0]);
    assert_eq!(backend.observations()[0].op, "histogram.observe");
}

#[test]
fn wrapper_with_tags_does_not_touch_receiver() {
    let backend = Arc::new(FakeBackend::default());
    let metrics = facade(
        backend.clone(),
        MetricsConfig::default().with_tag("a", "1").with_tag("b", "2"),
    );

    let w1 = metrics.counter("w", "d");
    let w2 = w1.with_tags(TagSet::new().with("c", "4"));

    assert_eq!(w1.resolved_tags(), map(&[("a", "1"), ("b", "2")]));
    assert_eq!(w2.resolved_tags(), map(&[("a", "1"), ("b", "2"), ("c", "4")]));

    // Both share the instrument registered with keys {a, b}.
    w2.inc();
    assert_eq!(backend.counters(), 1);
    let obs = backend.observations();
    assert_eq!(
        obs[0].labels,
        vec![("a".to_owned(), "1".to_owned()), ("b".to_owned(), "2".to_owned())]
    );
}

#[test]
fn wrapper_with_tags_overrides_bound_values() {
    let backend = Arc::new(FakeBackend::default());
    let metrics = facade(backend.clone(), MetricsConfig::default().with_tag("status", "ok"));

    let c = metrics.counter("requests_total", "d");
    c.with_tags(TagSet::new().with("status", "error")).inc();
    c.inc();

    let statuses: Vec<_> = backend
        .observations()
        .iter()
        .map(|o| o.label("status").unwrap().to_owned())
        .collect();
    assert_eq!(statuses, vec!["error", "ok"]);
}

#[test]
fn facade_with_tags_mutates_in_place_and_chains() {
    let backend = Arc::new(FakeBackend::default());
    let mut metrics = facade(backend.clone(), MetricsConfig::default().with_tag("a", "1"));

    let before = metrics.counter("before_total", "d");
    metrics
        .with_tags(TagSet::new().with("b", "2"))
        .with_tags(TagSet::new().with("a", "3"));

    assert_eq!(metrics.tags().keys(), vec!["a".to_owned(), "b".to_owned()]);
    assert_eq!(before.resolved_tags(), map(&[("a", "1")]));

    let after = metrics.counter("after_total", "d");
    assert_eq!(after.label_keys(), &["a".to_owned(), "b".to_owned()]);
    assert_eq!(after.resolved_tags(), map(&[("a", "3"), ("b", "2")]));
}

#[test]
fn conflicting_labels_reuse_first_registration_by_default() {
    let backend = Arc::new(FakeBackend::default());
    let (seen, sink) = collecting_sink();
    let base = facade(
        backend.clone(),
        MetricsConfig::default().with_tag("a", "1").with_error_sink(sink),
    );
    let mut wider = base.clone();
    wider.with_tags(TagSet::new().with("extra", "x"));

    base.counter("req_total", "d").inc();
    let reused = wider.counter("req_total", "d");
    reused.inc();

    assert_eq!(backend.counters(), 1);
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(reused.label_keys(), &["a".to_owned()]);
    // the undeclared key is dropped from the observation
    assert_eq!(
        backend.observations()[1].labels,
        vec![("a".to_owned(), "1".to_owned())]
    );
}

#[test]
fn conflicting_labels_rejected_when_configured() {
    let backend = Arc::new(FakeBackend::default());
    let registry = Arc::new(Registry::with_options(
        backend.clone(),
        RegistryOptions {
            label_conflict: LabelConflict::Reject,
            ..RegistryOptions::default()
        },
    ));
    let (seen, sink) = collecting_sink();
    let base = Metrics::new(
        registry,
        MetricsConfig::default().with_tag("a", "1").with_error_sink(sink),
    )
    .unwrap();
    let mut wider = base.clone();
    wider.with_tags(TagSet::new().with("extra", "x"));

    base.counter("req_total", "d");
    let rejected = wider.counter("req_total", "d");

    let errors = seen.lock().unwrap().clone();
    assert_eq!(
        errors,
        vec![MetricsError::LabelConflict {
            name: "req_total".into(),
            registered: "a".into(),
            requested: "a,extra".into(),
        }]
    );

    rejected.inc();
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert!(backend.observations().is_empty());
}

#[test]
fn kind_mismatch_falls_back_to_noop() {
    let backend = Arc::new(FakeBackend::default());
    let (seen, sink) = collecting_sink();
    let metrics = facade(backend.clone(), MetricsConfig::default().with_error_sink(sink));

    metrics.counter("shared", "d");
    metrics.gauge("shared", "d").set(1.0);

    assert_eq!(backend.gauges(), 0);
    let errors = seen.lock().unwrap().clone();
    assert_eq!(errors.len(), 2);
    assert!(matches!(errors[0], MetricsError::KindMismatch { .. }));
}

#[test]
fn context_extractors_fill_tags_per_observation() {
    let backend = Arc::new(FakeBackend::default());
    let cfg = MetricsConfig::default()
        .with_extractor("tenant", TagExtractor::from_context("tenant"))
        .with_tag("svc", "api");
    let metrics = facade(backend.clone(), cfg);

    let c = metrics.counter("ctx_total", "d");
    c.with_context(TagContext::new().with("tenant", "acme")).inc();
    c.inc();

    let obs = backend.observations();
    assert_eq!(obs[0].label("tenant"), Some("acme"));
    assert_eq!(obs[1].label("tenant"), Some(""));
    assert_eq!(obs[1].label("svc"), Some("api"));
}

#[test]
fn extractor_failure_never_reaches_the_caller() {
    let backend = Arc::new(FakeBackend::default());
    let cfg = MetricsConfig::default()
        .with_tag("boom", TagExtractor::from_fn(|_| panic!("bad extractor")))
        .with_tag("ok", "v");
    let metrics = facade(backend.clone(), cfg);

    metrics.histogram("h", "d", &[1.0]).observe(0.5);

    let obs = backend.observations();
    assert_eq!(obs.len(), 1);
    assert_eq!(obs[0].label("boom"), Some(""));
    assert_eq!(obs[0].label("ok"), Some("v"));
}

#[test]
fn backend_observation_errors_go_to_the_sink() {
    let backend = Arc::new(MemoryBackend::new());
    let (seen, sink) = collecting_sink();
    let metrics = Metrics::new(
        Arc::new(Registry::new(backend.clone())),
        MetricsConfig::default().with_error_sink(sink),
    )
    .unwrap();

    let c = metrics.counter("jobs_total", "d");
    c.add(-1.0);
    c.inc();

    let errors = seen.lock().unwrap().clone();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], MetricsError::InvalidObservation { .. }));
    assert_eq!(backend.counter_value("jobs_total", &[]), Some(1.0));
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let registry = Arc::new(Registry::new(Arc::new(FakeBackend::default())));
    let err = Metrics::new(registry, MetricsConfig::default().with_tag("no-dash", "v"))
        .err()
        .expect("must fail");
    assert!(matches!(err, MetricsError::BadConfig(_)));
}

#[test]
fn backend_panics_never_reach_the_call_site() {
    let (seen, sink) = collecting_sink();
    let registry = Arc::new(Registry::new(Arc::new(PanickingBackend)));
    let metrics = Metrics::new(
        registry.clone(),
        MetricsConfig::default().with_error_sink(sink),
    )
    .unwrap();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let counter = metrics.counter("x", "d");
        counter.inc();
        metrics.counter("x", "d").add(2.0);
        let gauge = metrics.gauge("g", "d");
        gauge.set(1.0);
        gauge.inc();
        gauge.dec();
    }));
    assert!(outcome.is_ok());

    let creation = MetricsError::Backend("backend panicked: x already registered".into());
    let observation = MetricsError::Backend("backend panicked: gauge exploded".into());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            // first request, then the no-op call
            creation.clone(),
            creation.clone(),
            // cached failure, then the no-op call
            creation.clone(),
            creation,
            observation.clone(),
            observation.clone(),
            observation,
        ]
    );
    assert_eq!(registry.len(), 2);
}

#[test]
fn gauge_inc_and_dec_move_by_one() {
    let backend = Arc::new(MemoryBackend::new());
    let metrics = Metrics::new(
        Arc::new(Registry::new(backend.clone())),
        MetricsConfig::default().with_tag("pool", "db"),
    )
    .unwrap();

    let open = metrics.gauge("connections_open", "d");
    open.set(3.0);
    open.inc();
    open.inc();
    open.dec();

    assert_eq!(backend.gauge_value("connections_open", &["db"]), Some(4.0));
}

#[test]
fn wrapper_keys_outside_the_registration_are_not_recorded() {
    let backend = Arc::new(FakeBackend::default());
    let metrics = facade(backend.clone(), MetricsConfig::default().with_tag("svc", "api"));

    let derived = metrics
        .histogram("latency", "d", &[0.1, 1.0])
        .with_tags(TagSet::new().with("route", "/pay"));
    derived.observe(0.3);

    assert_eq!(derived.label_keys(), &["svc".to_owned()]);
    assert_eq!(derived.resolved_tags(), map(&[("route", "/pay"), ("svc", "api")]));
    let obs = backend.observations();
    assert_eq!(obs[0].labels, vec![("svc".to_owned(), "api".to_owned())]);
    assert_eq!(obs[0].label("route"), None);
}
