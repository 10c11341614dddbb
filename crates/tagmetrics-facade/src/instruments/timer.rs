use std::sync::Arc;
use std::time::{Duration, Instant};

use tagmetrics_core::backend::HistogramHandle;
use tagmetrics_core::error::ErrorSink;
use tagmetrics_core::tags::TagSet;

use super::{tag_aware, TagBinding};
use crate::registry::RegisteredInstrument;

/// Duration histogram with bound tags. Durations are recorded in seconds.
#[derive(Clone)]
pub struct TaggedTimer {
    handle: Arc<dyn HistogramHandle>,
    binding: TagBinding,
}

impl TaggedTimer {
    pub(crate) fn new(
        registered: RegisteredInstrument<dyn HistogramHandle>,
        tags: TagSet,
        sink: ErrorSink,
    ) -> Self {
        Self {
            handle: registered.handle,
            binding: TagBinding::new(tags, registered.label_keys, sink),
        }
    }

    pub fn record(&self, elapsed: Duration) {
        self.binding
            .record(|values| self.handle.observe(elapsed.as_secs_f64(), values));
    }

    /// Start a scope. The elapsed time is recorded exactly once: on
    /// [`TimerScope::stop`], or when the scope is dropped on any other exit
    /// path (early return, `?`, unwinding).
    pub fn start(&self) -> TimerScope {
        TimerScope {
            timer: self.clone(),
            started: Instant::now(),
            recorded: false,
        }
    }

    /// Run `f` inside a scope and return its result.
    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let _scope = self.start();
        f()
    }
}

tag_aware!(TaggedTimer);

/// Running measurement returned by [`TaggedTimer::start`].
#[must_use = "dropping the scope immediately records a near-zero duration"]
pub struct TimerScope {
    timer: TaggedTimer,
    started: Instant,
    recorded: bool,
}

impl TimerScope {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record now and return what was recorded.
    pub fn stop(mut self) -> Duration {
        self.finish()
    }

    fn finish(&mut self) -> Duration {
        let elapsed = self.started.elapsed();
        if !self.recorded {
            self.recorded = true;
            self.timer.record(elapsed);
        }
        elapsed
    }
}

impl Drop for TimerScope {
    fn drop(&mut self) {
        self.finish();
    }
}
