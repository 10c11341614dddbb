//! Tag store merge/resolve behavior as seen by callers.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tagmetrics_core::{ExtractorError, TagContext, TagExtractor, TagSet};

fn resolved(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

#[test]
fn override_wins_and_union_is_kept() {
    let base = TagSet::new().with("a", "1");
    let overrides = TagSet::new().with("a", "2").with("b", "3");

    let merged = base.merge(&overrides);
    assert_eq!(merged.resolve(&TagContext::new()), resolved(&[("a", "2"), ("b", "3")]));
}

#[test]
fn sorted_keys_do_not_depend_on_insertion_order() {
    let one = TagSet::new().with("b", "x").with("a", "y").with("c", "z");
    let two = TagSet::new().with("c", "z").with("b", "x").with("a", "y");
    assert_eq!(one.keys(), vec!["a", "b", "c"]);
    assert_eq!(one.keys(), two.keys());
}

#[test]
fn extend_is_the_in_place_merge() {
    let mut set = TagSet::new().with("a", "1");
    set.extend(&TagSet::new().with("a", "9").with("z", "0"));
    assert_eq!(set.resolve(&TagContext::new()), resolved(&[("a", "9"), ("z", "0")]));
}

#[test]
fn extractors_run_at_resolution_time() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let set = TagSet::new().with(
        "seq",
        TagExtractor::from_fn(move |_| counter.fetch_add(1, Ordering::SeqCst).to_string()),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(set.resolve(&TagContext::new())["seq"], "0");
    assert_eq!(set.resolve(&TagContext::new())["seq"], "1");
}

#[test]
fn fallible_extractors_degrade_to_empty() {
    let set = TagSet::new()
        .with("region", TagExtractor::from_context("region"))
        .with(
            "shard",
            TagExtractor::fallible(|ctx| {
                ctx.get("shard")
                    .map(str::to_owned)
                    .ok_or_else(|| ExtractorError::Failed("no shard".into()))
            }),
        );

    let ctx = TagContext::new().with("region", "eu");
    assert_eq!(set.resolve(&ctx), resolved(&[("region", "eu"), ("shard", "")]));

    let keys = vec!["shard".to_owned(), "region".to_owned()];
    let ctx = ctx.with("shard", "7");
    assert_eq!(set.resolve_values(&keys, &ctx), vec!["7", "eu"]);
}

#[test]
fn context_filled_in_place_feeds_extractors() {
    let set = TagSet::new()
        .with("tenant", TagExtractor::from_context("tenant"))
        .with("svc", "api");
    assert!(set.contains_key("tenant"));
    assert!(!set.contains_key("route"));

    let mut ctx = TagContext::new();
    assert!(ctx.is_empty());
    ctx.insert("tenant", "acme");
    assert!(!ctx.is_empty());
    assert_eq!(set.resolve(&ctx), resolved(&[("svc", "api"), ("tenant", "acme")]));
}
