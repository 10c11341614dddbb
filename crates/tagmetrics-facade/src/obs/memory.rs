//! In-process reference backend.
//!
//! Counter/gauge/histogram families keyed by name, each holding one series per
//! label-value vector in a `DashMap`. Values are `f64` stored as bits in
//! atomics. Rendering follows the Prometheus text exposition format, sorted by
//! name and label values so output is deterministic.
//!
//! Like real backends it refuses a second registration of the same name, which
//! is what the registry's at-most-once guarantee protects against.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use tagmetrics_core::backend::{
    validate_buckets, validate_metric_name, CounterHandle, GaugeHandle, HistogramHandle,
    MetricsBackend,
};
use tagmetrics_core::error::{MetricsError, Result};
use tagmetrics_core::tags::validate_label_key;

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

#[derive(Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed);
    }

    fn fetch_add(&self, delta: f64) {
        let mut cur = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(cur) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }
}

struct Meta {
    name: String,
    help: String,
    label_keys: Vec<String>,
}

impl Meta {
    fn check(&self, label_values: &[String]) -> Result<()> {
        if label_values.len() != self.label_keys.len() {
            return Err(MetricsError::LabelCardinality {
                name: self.name.clone(),
                expected: self.label_keys.len(),
                got: label_values.len(),
            });
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> MetricsError {
        MetricsError::InvalidObservation {
            name: self.name.clone(),
            reason: reason.to_owned(),
        }
    }

    fn header(&self, kind: &str, out: &mut String) {
        if !self.help.is_empty() {
            let _ = writeln!(out, "# HELP {} {}", self.name, escape_help(&self.help));
        }
        let _ = writeln!(out, "# TYPE {} {}", self.name, kind);
    }

    /// `k1="v1",k2="v2"` for one series, empty when the family has no labels.
    fn label_str(&self, values: &[String]) -> String {
        self.label_keys
            .iter()
            .zip(values)
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Apply `f` to the series for `label_values`, creating it on first use.
fn with_series<V: Default, R>(
    map: &DashMap<Vec<String>, V>,
    label_values: &[String],
    f: impl FnOnce(&V) -> R,
) -> R {
    if let Some(series) = map.get(label_values) {
        return f(series.value());
    }
    let series = map.entry(label_values.to_vec()).or_insert_with(V::default);
    f(series.value())
}

/// Snapshot of a family's series, sorted by label values.
fn sorted_series<V, T>(
    map: &DashMap<Vec<String>, V>,
    read: impl Fn(&V) -> T,
) -> Vec<(Vec<String>, T)> {
    let mut rows: Vec<(Vec<String>, T)> = map
        .iter()
        .map(|r| (r.key().clone(), read(r.value())))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

fn series_line(out: &mut String, name: &str, labels: &str, value: impl std::fmt::Display) {
    if labels.is_empty() {
        let _ = writeln!(out, "{} {}", name, value);
    } else {
        let _ = writeln!(out, "{}{{{}}} {}", name, labels, value);
    }
}

pub struct MemoryCounter {
    meta: Meta,
    series: DashMap<Vec<String>, AtomicF64>,
}

impl CounterHandle for MemoryCounter {
    fn add(&self, value: f64, label_values: &[String]) -> Result<()> {
        self.meta.check(label_values)?;
        if !value.is_finite() || value < 0.0 {
            return Err(self.meta.invalid("counter increments must be finite and non-negative"));
        }
        with_series(&self.series, label_values, |c| c.fetch_add(value));
        Ok(())
    }
}

impl MemoryCounter {
    fn render(&self, out: &mut String) {
        self.meta.header("counter", out);
        for (values, v) in sorted_series(&self.series, AtomicF64::load) {
            series_line(out, &self.meta.name, &self.meta.label_str(&values), v);
        }
    }
}

pub struct MemoryGauge {
    meta: Meta,
    series: DashMap<Vec<String>, AtomicF64>,
}

impl GaugeHandle for MemoryGauge {
    fn set(&self, value: f64, label_values: &[String]) -> Result<()> {
        self.meta.check(label_values)?;
        if value.is_nan() {
            return Err(self.meta.invalid("gauge value is NaN"));
        }
        with_series(&self.series, label_values, |g| g.store(value));
        Ok(())
    }

    fn add(&self, delta: f64, label_values: &[String]) -> Result<()> {
        self.meta.check(label_values)?;
        if !delta.is_finite() {
            return Err(self.meta.invalid("gauge delta must be finite"));
        }
        with_series(&self.series, label_values, |g| g.fetch_add(delta));
        Ok(())
    }
}

impl MemoryGauge {
    fn render(&self, out: &mut String) {
        self.meta.header("gauge", out);
        for (values, v) in sorted_series(&self.series, AtomicF64::load) {
            series_line(out, &self.meta.name, &self.meta.label_str(&values), v);
        }
    }
}

#[derive(Default)]
struct HistogramSeries {
    count: AtomicU64,
    sum: AtomicF64,
    // Cumulative: index i counts observations <= bounds[i]. Sized lazily on
    // first observation since `Default` does not know the bucket count.
    buckets: std::sync::OnceLock<Vec<AtomicU64>>,
}

impl HistogramSeries {
    fn bucket_counts(&self, n: usize) -> &[AtomicU64] {
        self.buckets
            .get_or_init(|| (0..n).map(|_| AtomicU64::new(0)).collect())
    }
}

pub struct MemoryHistogram {
    meta: Meta,
    bounds: Vec<f64>,
    series: DashMap<Vec<String>, HistogramSeries>,
}

impl HistogramHandle for MemoryHistogram {
    fn observe(&self, value: f64, label_values: &[String]) -> Result<()> {
        self.meta.check(label_values)?;
        if value.is_nan() {
            return Err(self.meta.invalid("histogram observation is NaN"));
        }
        let n = self.bounds.len();
        with_series(&self.series, label_values, |h| {
            h.count.fetch_add(1, Ordering::Relaxed);
            h.sum.fetch_add(value);
            for (bound, slot) in self.bounds.iter().zip(h.bucket_counts(n)) {
                if value <= *bound {
                    slot.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
        Ok(())
    }
}

struct HistogramRow {
    count: u64,
    sum: f64,
    buckets: Vec<u64>,
}

impl MemoryHistogram {
    fn read(&self, h: &HistogramSeries) -> HistogramRow {
        HistogramRow {
            count: h.count.load(Ordering::Relaxed),
            sum: h.sum.load(),
            buckets: h
                .bucket_counts(self.bounds.len())
                .iter()
                .map(|b| b.load(Ordering::Relaxed))
                .collect(),
        }
    }

    fn render(&self, out: &mut String) {
        let name = &self.meta.name;
        self.meta.header("histogram", out);
        for (values, row) in sorted_series(&self.series, |h| self.read(h)) {
            let label_str = self.meta.label_str(&values);
            let prefix = if label_str.is_empty() {
                String::new()
            } else {
                format!("{},", label_str)
            };

            for (le, count) in self.bounds.iter().zip(&row.buckets) {
                let _ = writeln!(out, "{}_bucket{{{}le=\"{}\"}} {}", name, prefix, le, count);
            }
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, prefix, row.count);
            series_line(out, &format!("{name}_sum"), &label_str, row.sum);
            series_line(out, &format!("{name}_count"), &label_str, row.count);
        }
    }
}

#[derive(Clone)]
enum Family {
    Counter(Arc<MemoryCounter>),
    Gauge(Arc<MemoryGauge>),
    Histogram(Arc<MemoryHistogram>),
}

/// Reference [`MetricsBackend`] keeping everything in process memory.
#[derive(Default)]
pub struct MemoryBackend {
    families: DashMap<String, Family>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        &self,
        name: &str,
        description: &str,
        label_keys: &[String],
        make: impl FnOnce(Meta) -> Family,
    ) -> Result<Family> {
        validate_metric_name(name)?;
        for (i, key) in label_keys.iter().enumerate() {
            let duplicate = label_keys[..i].contains(key);
            if duplicate || validate_label_key(key).is_err() {
                return Err(MetricsError::InvalidLabel {
                    name: name.to_owned(),
                    key: key.clone(),
                });
            }
        }

        match self.families.entry(name.to_owned()) {
            Entry::Occupied(_) => Err(MetricsError::AlreadyRegistered(name.to_owned())),
            Entry::Vacant(slot) => {
                let family = make(Meta {
                    name: name.to_owned(),
                    help: description.to_owned(),
                    label_keys: label_keys.to_vec(),
                });
                slot.insert(family.clone());
                Ok(family)
            }
        }
    }

    fn family(&self, name: &str) -> Option<Family> {
        self.families.get(name).map(|r| r.value().clone())
    }

    /// Number of registered families.
    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Label keys a family was registered with.
    pub fn label_keys(&self, name: &str) -> Option<Vec<String>> {
        self.family(name).map(|f| match f {
            Family::Counter(c) => c.meta.label_keys.clone(),
            Family::Gauge(g) => g.meta.label_keys.clone(),
            Family::Histogram(h) => h.meta.label_keys.clone(),
        })
    }

    pub fn counter_value(&self, name: &str, label_values: &[&str]) -> Option<f64> {
        let Some(Family::Counter(c)) = self.family(name) else {
            return None;
        };
        let key = owned(label_values);
        c.series.get(&key).map(|v| v.load())
    }

    pub fn gauge_value(&self, name: &str, label_values: &[&str]) -> Option<f64> {
        let Some(Family::Gauge(g)) = self.family(name) else {
            return None;
        };
        let key = owned(label_values);
        g.series.get(&key).map(|v| v.load())
    }

    pub fn histogram_count(&self, name: &str, label_values: &[&str]) -> Option<u64> {
        let Some(Family::Histogram(h)) = self.family(name) else {
            return None;
        };
        let key = owned(label_values);
        h.series.get(&key).map(|s| s.count.load(Ordering::Relaxed))
    }

    pub fn histogram_sum(&self, name: &str, label_values: &[&str]) -> Option<f64> {
        let Some(Family::Histogram(h)) = self.family(name) else {
            return None;
        };
        let key = owned(label_values);
        h.series.get(&key).map(|s| s.sum.load())
    }

    /// Bucket upper bounds a histogram family was registered with.
    pub fn histogram_bounds(&self, name: &str) -> Option<Vec<f64>> {
        match self.family(name)? {
            Family::Histogram(h) => Some(h.bounds.clone()),
            _ => None,
        }
    }

    /// Render every family in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut families: Vec<(String, Family)> = self
            .families
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        families.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = String::new();
        for (_, family) in families {
            match family {
                Family::Counter(c) => c.render(&mut out),
                Family::Gauge(g) => g.render(&mut out),
                Family::Histogram(h) => h.render(&mut out),
            }
        }
        out
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

impl MetricsBackend for MemoryBackend {
    fn create_counter(
        &self,
        name: &str,
        description: &str,
        label_keys: &[String],
    ) -> Result<Arc<dyn CounterHandle>> {
        let family = self.register(name, description, label_keys, |meta| {
            Family::Counter(Arc::new(MemoryCounter { meta, series: DashMap::new() }))
        })?;
        match family {
            Family::Counter(c) => Ok(c),
            _ => Err(MetricsError::Backend(format!("family {name} is not a counter"))),
        }
    }

    fn create_gauge(
        &self,
        name: &str,
        description: &str,
        label_keys: &[String],
    ) -> Result<Arc<dyn GaugeHandle>> {
        let family = self.register(name, description, label_keys, |meta| {
            Family::Gauge(Arc::new(MemoryGauge { meta, series: DashMap::new() }))
        })?;
        match family {
            Family::Gauge(g) => Ok(g),
            _ => Err(MetricsError::Backend(format!("family {name} is not a gauge"))),
        }
    }

    fn create_histogram(
        &self,
        name: &str,
        description: &str,
        buckets: &[f64],
        label_keys: &[String],
    ) -> Result<Arc<dyn HistogramHandle>> {
        validate_buckets(name, buckets)?;
        let bounds = buckets.to_vec();
        let family = self.register(name, description, label_keys, move |meta| {
            Family::Histogram(Arc::new(MemoryHistogram {
                meta,
                bounds,
                series: DashMap::new(),
            }))
        })?;
        match family {
            Family::Histogram(h) => Ok(h),
            _ => Err(MetricsError::Backend(format!("family {name} is not a histogram"))),
        }
    }
}
