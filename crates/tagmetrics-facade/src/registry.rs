//! Instrument registry: at most one backend instrument per metric name.
//!
//! The first request for a name calls the backend and caches the outcome,
//! success or failure. Every later request for that name is answered from the
//! cache. Concurrent first requests are serialized on the name's `DashMap`
//! shard, so exactly one backend creation happens; once cached, lookups only
//! take a shared read lock.

use std::sync::Arc;

use dashmap::DashMap;

use tagmetrics_core::backend::{
    guarded, CounterHandle, GaugeHandle, HistogramHandle, MetricsBackend,
};
use tagmetrics_core::error::{InstrumentKind, MetricsError, Result};

pub use crate::config::schema::{LabelConflict, DEFAULT_TIMER_BUCKETS};

/// `(name, description, sorted tag keys, [buckets])`.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentIdentity {
    pub name: String,
    pub description: String,
    pub label_keys: Vec<String>,
    pub buckets: Option<Vec<f64>>,
}

impl InstrumentIdentity {
    /// Same labels and buckets. The description is informational and never
    /// makes two requests conflict.
    fn compatible_with(&self, other: &InstrumentIdentity) -> bool {
        self.label_keys == other.label_keys && self.buckets == other.buckets
    }
}

/// A backend handle plus the label keys it was registered with.
///
/// Label keys come from the first successful registration for the name, which
/// may differ from the keys of the current request under
/// [`LabelConflict::Reuse`].
pub struct RegisteredInstrument<H: ?Sized> {
    pub handle: Arc<H>,
    pub label_keys: Arc<[String]>,
}

impl<H: ?Sized> Clone for RegisteredInstrument<H> {
    fn clone(&self) -> Self {
        Self {
            handle: Arc::clone(&self.handle),
            label_keys: Arc::clone(&self.label_keys),
        }
    }
}

#[derive(Clone)]
enum Handle {
    Counter(Arc<dyn CounterHandle>),
    Gauge(Arc<dyn GaugeHandle>),
    Histogram(Arc<dyn HistogramHandle>),
}

#[derive(Clone)]
struct Registration {
    kind: InstrumentKind,
    identity: InstrumentIdentity,
    label_keys: Arc<[String]>,
    outcome: std::result::Result<Handle, MetricsError>,
}

/// Registry options; see [`crate::config::MetricsSettings`] for the YAML form.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// Ladder used by timers requested without buckets.
    pub timer_buckets: Vec<f64>,
    pub label_conflict: LabelConflict,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            timer_buckets: DEFAULT_TIMER_BUCKETS.to_vec(),
            label_conflict: LabelConflict::default(),
        }
    }
}

/// Process-lifetime instrument cache in front of a [`MetricsBackend`].
///
/// Construct once at startup and share via `Arc`.
pub struct Registry {
    backend: Arc<dyn MetricsBackend>,
    entries: DashMap<String, Registration>,
    opts: RegistryOptions,
}

impl Registry {
    pub fn new(backend: Arc<dyn MetricsBackend>) -> Self {
        Self::with_options(backend, RegistryOptions::default())
    }

    pub fn with_options(backend: Arc<dyn MetricsBackend>, opts: RegistryOptions) -> Self {
        Self {
            backend,
            entries: DashMap::new(),
            opts,
        }
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.opts
    }

    /// Number of names seen so far, failed registrations included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load_or_store_counter(
        &self,
        name: &str,
        description: &str,
        label_keys: &[String],
    ) -> Result<RegisteredInstrument<dyn CounterHandle>> {
        let identity = identity(name, description, label_keys, None);
        let (handle, label_keys) =
            self.load_or_store(InstrumentKind::Counter, identity, |backend, id| {
                backend
                    .create_counter(&id.name, &id.description, &id.label_keys)
                    .map(Handle::Counter)
            })?;
        match handle {
            Handle::Counter(handle) => Ok(RegisteredInstrument { handle, label_keys }),
            _ => Err(kind_mismatch(name, InstrumentKind::Counter)),
        }
    }

    pub fn load_or_store_gauge(
        &self,
        name: &str,
        description: &str,
        label_keys: &[String],
    ) -> Result<RegisteredInstrument<dyn GaugeHandle>> {
        let identity = identity(name, description, label_keys, None);
        let (handle, label_keys) =
            self.load_or_store(InstrumentKind::Gauge, identity, |backend, id| {
                backend
                    .create_gauge(&id.name, &id.description, &id.label_keys)
                    .map(Handle::Gauge)
            })?;
        match handle {
            Handle::Gauge(handle) => Ok(RegisteredInstrument { handle, label_keys }),
            _ => Err(kind_mismatch(name, InstrumentKind::Gauge)),
        }
    }

    pub fn load_or_store_histogram(
        &self,
        name: &str,
        description: &str,
        buckets: &[f64],
        label_keys: &[String],
    ) -> Result<RegisteredInstrument<dyn HistogramHandle>> {
        let identity = identity(name, description, label_keys, Some(buckets));
        let (handle, label_keys) =
            self.load_or_store(InstrumentKind::Histogram, identity, |backend, id| {
                let buckets = id.buckets.as_deref().unwrap_or_default();
                backend
                    .create_histogram(&id.name, &id.description, buckets, &id.label_keys)
                    .map(Handle::Histogram)
            })?;
        match handle {
            Handle::Histogram(handle) => Ok(RegisteredInstrument { handle, label_keys }),
            _ => Err(kind_mismatch(name, InstrumentKind::Histogram)),
        }
    }

    /// Timers are histograms. Missing or empty buckets fall back to
    /// [`RegistryOptions::timer_buckets`].
    pub fn load_or_store_timer(
        &self,
        name: &str,
        description: &str,
        buckets: Option<&[f64]>,
        label_keys: &[String],
    ) -> Result<RegisteredInstrument<dyn HistogramHandle>> {
        let buckets = match buckets {
            Some(b) if !b.is_empty() => b,
            _ => self.opts.timer_buckets.as_slice(),
        };
        self.load_or_store_histogram(name, description, buckets, label_keys)
    }

    fn load_or_store<F>(
        &self,
        kind: InstrumentKind,
        requested: InstrumentIdentity,
        create: F,
    ) -> Result<(Handle, Arc<[String]>)>
    where
        F: FnOnce(&dyn MetricsBackend, &InstrumentIdentity) -> Result<Handle>,
    {
        // Fast path: shared read lock only.
        if let Some(existing) = self.entries.get(&requested.name) {
            let reg = existing.value().clone();
            drop(existing);
            return self.settle(kind, &requested, reg);
        }

        // Slow path: the shard write lock is held while the backend runs, so
        // racing first callers wait here and then read the stored outcome. A
        // panicking backend is cached like any other failure.
        let reg = self
            .entries
            .entry(requested.name.clone())
            .or_insert_with(|| {
                let outcome = guarded(|| create(self.backend.as_ref(), &requested));
                match &outcome {
                    Ok(_) => tracing::debug!(
                        name = %requested.name,
                        kind = %kind,
                        labels = ?requested.label_keys,
                        "instrument registered"
                    ),
                    Err(e) => tracing::warn!(
                        name = %requested.name,
                        kind = %kind,
                        error = %e,
                        "instrument registration failed"
                    ),
                }
                Registration {
                    kind,
                    identity: requested.clone(),
                    label_keys: requested.label_keys.clone().into(),
                    outcome,
                }
            })
            .value()
            .clone();

        self.settle(kind, &requested, reg)
    }

    /// Turn a cached registration into the answer for `requested`.
    fn settle(
        &self,
        kind: InstrumentKind,
        requested: &InstrumentIdentity,
        reg: Registration,
    ) -> Result<(Handle, Arc<[String]>)> {
        if reg.kind != kind {
            return Err(MetricsError::KindMismatch {
                name: requested.name.clone(),
                registered: reg.kind,
                requested: kind,
            });
        }

        let handle = reg.outcome?;

        if !reg.identity.compatible_with(requested) {
            match self.opts.label_conflict {
                LabelConflict::Reuse => {
                    tracing::warn!(
                        name = %requested.name,
                        registered = ?reg.identity.label_keys,
                        requested = ?requested.label_keys,
                        "identity conflict, reusing first registration"
                    );
                }
                LabelConflict::Reject => {
                    return Err(MetricsError::LabelConflict {
                        name: requested.name.clone(),
                        registered: describe(&reg.identity),
                        requested: describe(requested),
                    });
                }
            }
        }

        Ok((handle, reg.label_keys))
    }
}

fn identity(
    name: &str,
    description: &str,
    label_keys: &[String],
    buckets: Option<&[f64]>,
) -> InstrumentIdentity {
    let mut label_keys = label_keys.to_vec();
    label_keys.sort();
    label_keys.dedup();
    InstrumentIdentity {
        name: name.to_owned(),
        description: description.to_owned(),
        label_keys,
        buckets: buckets.map(<[f64]>::to_vec),
    }
}

fn describe(id: &InstrumentIdentity) -> String {
    let mut s = id.label_keys.join(",");
    if let Some(b) = &id.buckets {
        s.push_str(&format!("; buckets={b:?}"));
    }
    s
}

// `settle` already rejects kind mismatches; this covers a backend returning
// the wrong handle variant for a kind.
fn kind_mismatch(name: &str, requested: InstrumentKind) -> MetricsError {
    MetricsError::Backend(format!("registry holds a non-{requested} handle for {name}"))
}
