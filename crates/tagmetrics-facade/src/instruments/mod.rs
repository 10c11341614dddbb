//! Tag-aware instrument wrappers.
//!
//! Each wrapper pairs a shared backend handle with a [`TagBinding`]. On every
//! observation the binding resolves its extractors and the wrapper forwards
//! the value plus the label values to the handle. Backend errors go to the
//! error sink; nothing is returned to the caller.
//!
//! `with_tags` and `with_context` on a wrapper never mutate it: they return a
//! new wrapper sharing the same handle. Contrast with
//! [`crate::Metrics::with_tags`], which mutates the facade in place.

/// Tag plumbing shared by all wrapper kinds.
macro_rules! tag_aware {
    ($ty:ident) => {
        impl $ty {
            /// New wrapper with `tags` merged over this one's. `self` is left
            /// untouched and both share the same backend instrument.
            ///
            /// Only the instrument's registered [`label_keys`](Self::label_keys)
            /// are recorded. A key added here that the instrument was not
            /// registered with shows up in `resolved_tags` but is dropped from
            /// observations (logged at `debug` when the wrapper is derived).
            pub fn with_tags(&self, tags: tagmetrics_core::tags::TagSet) -> Self {
                Self {
                    handle: std::sync::Arc::clone(&self.handle),
                    binding: self.binding.with_tags(&tags),
                }
            }

            /// New wrapper whose extractors read from `context`.
            pub fn with_context(&self, context: tagmetrics_core::tags::TagContext) -> Self {
                Self {
                    handle: std::sync::Arc::clone(&self.handle),
                    binding: self.binding.with_context(context),
                }
            }

            /// Bound tags resolved as they would be for an observation now.
            pub fn resolved_tags(&self) -> std::collections::BTreeMap<String, String> {
                self.binding.resolve()
            }

            /// Label keys of the underlying instrument.
            pub fn label_keys(&self) -> &[String] {
                self.binding.label_keys()
            }
        }
    };
}

pub(crate) use tag_aware;

mod binding;
mod counter;
mod gauge;
mod histogram;
mod timer;

pub(crate) use binding::TagBinding;
pub use counter::TaggedCounter;
pub use gauge::TaggedGauge;
pub use histogram::TaggedHistogram;
pub use timer::{TaggedTimer, TimerScope};
