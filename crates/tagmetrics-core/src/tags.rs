//! Tag store: tag keys bound to deferred value extractors.
//!
//! A [`TagSet`] keeps its keys in a `BTreeMap`, so key order is always
//! lexicographic. Registry identity and backend label order both rely on this:
//! `{b, a}` and `{a, b}` are the same set of label keys.
//!
//! Extractors run on the observation path. A failing or panicking extractor
//! resolves to an empty string; it never aborts the observation.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{panic_message, ExtractorError, MetricsError, Result};

/// Request-scoped values handed to extractors at observation time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagContext {
    values: HashMap<String, String>,
}

impl TagContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

type ExtractFn = dyn Fn(&TagContext) -> std::result::Result<String, ExtractorError> + Send + Sync;

/// Deferred tag value.
///
/// Extractors are caller-supplied and run synchronously on every observation.
/// Keeping them fast and non-blocking is the caller's responsibility; the
/// facade cannot bound them.
#[derive(Clone)]
pub struct TagExtractor(Arc<ExtractFn>);

impl TagExtractor {
    /// Always yields `value`.
    pub fn constant(value: impl Into<String>) -> Self {
        let value: String = value.into();
        Self(Arc::new(move |_| Ok(value.clone())))
    }

    /// Reads `key` from the bound [`TagContext`]; fails when it is absent.
    pub fn from_context(key: impl Into<String>) -> Self {
        let key: String = key.into();
        Self(Arc::new(move |ctx| {
            ctx.get(&key)
                .map(str::to_owned)
                .ok_or_else(|| ExtractorError::MissingContext(key.clone()))
        }))
    }

    /// Infallible closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&TagContext) -> String + Send + Sync + 'static,
    {
        Self(Arc::new(move |ctx| Ok(f(ctx))))
    }

    /// Fallible closure; an error resolves to an empty value.
    pub fn fallible<F>(f: F) -> Self
    where
        F: Fn(&TagContext) -> std::result::Result<String, ExtractorError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Run the extractor. Panics inside the closure are caught and reported
    /// as [`ExtractorError::Failed`].
    pub fn extract(&self, ctx: &TagContext) -> std::result::Result<String, ExtractorError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.0)(ctx))) {
            Ok(res) => res,
            Err(payload) => Err(ExtractorError::Failed(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for TagExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TagExtractor(..)")
    }
}

impl From<&str> for TagExtractor {
    fn from(value: &str) -> Self {
        TagExtractor::constant(value)
    }
}

impl From<String> for TagExtractor {
    fn from(value: String) -> Self {
        TagExtractor::constant(value)
    }
}

/// Tag key → extractor mapping.
#[derive(Debug, Clone, Default)]
pub struct TagSet {
    inner: BTreeMap<String, TagExtractor>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; replaces an existing extractor for `key`.
    pub fn with(mut self, key: impl Into<String>, extractor: impl Into<TagExtractor>) -> Self {
        self.insert(key, extractor);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, extractor: impl Into<TagExtractor>) {
        self.inner.insert(key.into(), extractor.into());
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// New set with every key of `self` and `overrides`; `overrides` wins on
    /// shared keys. Neither input is modified.
    pub fn merge(&self, overrides: &TagSet) -> TagSet {
        let mut inner = self.inner.clone();
        for (k, v) in &overrides.inner {
            inner.insert(k.clone(), v.clone());
        }
        TagSet { inner }
    }

    /// In-place variant of [`TagSet::merge`].
    pub fn extend(&mut self, overrides: &TagSet) {
        for (k, v) in &overrides.inner {
            self.inner.insert(k.clone(), v.clone());
        }
    }

    /// Keys in lexicographic order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.keys().cloned().collect()
    }

    /// Evaluate every extractor against `ctx`.
    pub fn resolve(&self, ctx: &TagContext) -> BTreeMap<String, String> {
        self.inner
            .iter()
            .map(|(k, ext)| (k.clone(), run_extractor(k, ext, ctx)))
            .collect()
    }

    /// Resolve only `keys`, in the order given. Keys without an extractor
    /// resolve to an empty string.
    pub fn resolve_values(&self, keys: &[String], ctx: &TagContext) -> Vec<String> {
        keys.iter()
            .map(|k| match self.inner.get(k) {
                Some(ext) => run_extractor(k, ext, ctx),
                None => String::new(),
            })
            .collect()
    }

    /// Check every key with [`validate_label_key`].
    pub fn validate(&self) -> Result<()> {
        for k in self.inner.keys() {
            validate_label_key(k)?;
        }
        Ok(())
    }
}

impl<K, V> FromIterator<(K, V)> for TagSet
where
    K: Into<String>,
    V: Into<TagExtractor>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

fn run_extractor(key: &str, ext: &TagExtractor, ctx: &TagContext) -> String {
    match ext.extract(ctx) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(tag = %key, error = %e, "tag extractor failed, using empty value");
            String::new()
        }
    }
}

/// Label keys follow the Prometheus rules: `[a-zA-Z_][a-zA-Z0-9_]*`, and the
/// `__` prefix is reserved.
pub fn validate_label_key(key: &str) -> Result<()> {
    let mut chars = key.chars();
    let head_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !head_ok || !tail_ok || key.starts_with("__") {
        return Err(MetricsError::BadConfig(format!("invalid tag key: {key:?}")));
    }
    Ok(())
}
