//! Call-site profiling
//!
//! Two ways to time work, both feeding [`CallRecorder`]:
//!
//! - [`Profiler::profile`] wraps a closure returning `Result`; `Ok` is a
//!   success, `Err` a failure, and the result is handed back untouched.
//! - [`Profiler::time_block`] returns a [`BlockTimer`] guard that records
//!   exactly once, when finished explicitly or when dropped.
//!
//! A panic inside profiled code is recorded as a failure and keeps
//! unwinding. When profiling is disabled every entry point is a plain
//! pass-through: no clock reads, no allocation, no recorder access.

use crate::clock::{Clock, SystemClock};
use crate::recorder::CallRecorder;
use crate::sampler::SystemSampler;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Name prefix for samples recorded by [`Profiler::time_block`]
pub const BLOCK_PREFIX: &str = "block_";

/// Name prefix for samples recorded by [`Profiler::log_slow_query`]
pub const SLOW_QUERY_PREFIX: &str = "slow_query_";

/// Times operations and forwards samples to a shared recorder
pub struct Profiler {
    recorder: Arc<CallRecorder>,
    sampler: Option<Arc<SystemSampler>>,
    clock: Arc<dyn Clock>,
    enabled: bool,
    track_memory: bool,
}

impl Profiler {
    pub fn new(recorder: Arc<CallRecorder>, enabled: bool) -> Self {
        Self {
            recorder,
            sampler: None,
            clock: Arc::new(SystemClock),
            enabled,
            track_memory: false,
        }
    }

    /// Trigger rate-limited resource snapshots from every profiled call
    pub fn with_sampler(mut self, sampler: Arc<SystemSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Measure process memory around each call (needs a sampler)
    pub fn with_memory_tracking(mut self, track: bool) -> Self {
        self.track_memory = track;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn recorder(&self) -> &Arc<CallRecorder> {
        &self.recorder
    }

    /// Run `op` as a profiled operation named `name`
    ///
    /// # Example
    /// ```
    /// use perfcache::profiler::Profiler;
    /// use perfcache::recorder::CallRecorder;
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let recorder = Arc::new(CallRecorder::new(Duration::from_secs(1)));
    /// let profiler = Profiler::new(recorder.clone(), true);
    ///
    /// let ok: Result<u32, String> = profiler.profile("parse", || Ok(7));
    /// let err: Result<u32, String> = profiler.profile("parse", || Err("bad".into()));
    /// assert_eq!(ok, Ok(7));
    /// assert_eq!(err, Err("bad".to_string()));
    ///
    /// let stats = recorder.function_stats("parse").unwrap();
    /// assert_eq!((stats.success_count, stats.error_count), (1, 1));
    /// ```
    pub fn profile<T, E, F>(&self, name: &str, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if !self.enabled {
            return op();
        }
        let timer = self.start(name.to_string());
        let result = op();
        timer.complete(result.is_ok());
        result
    }

    /// Run `op`, which cannot fail short of panicking, as a profiled operation
    pub fn profile_infallible<T, F>(&self, name: &str, op: F) -> T
    where
        F: FnOnce() -> T,
    {
        if !self.enabled {
            return op();
        }
        let timer = self.start(name.to_string());
        let value = op();
        timer.complete(true);
        value
    }

    /// Wrap a one-argument function so every call is profiled under `name`
    pub fn wrap<'a, A, T, E, F>(&'a self, name: &'a str, f: F) -> impl Fn(A) -> Result<T, E> + 'a
    where
        F: Fn(A) -> Result<T, E> + 'a,
    {
        move |arg| self.profile(name, || f(arg))
    }

    /// Start timing a block of code, recorded as `block_<name>`
    ///
    /// # Example
    /// ```
    /// use perfcache::profiler::Profiler;
    /// use perfcache::recorder::CallRecorder;
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// let recorder = Arc::new(CallRecorder::new(Duration::from_secs(1)));
    /// let profiler = Profiler::new(recorder.clone(), true);
    /// {
    ///     let _timer = profiler.time_block("render");
    ///     // ... work ...
    /// }
    /// assert_eq!(recorder.function_stats("block_render").unwrap().call_count, 1);
    /// ```
    pub fn time_block(&self, name: &str) -> BlockTimer<'_> {
        if !self.enabled {
            return BlockTimer { active: None };
        }
        self.start(format!("{BLOCK_PREFIX}{name}"))
    }

    /// Warn about a query slower than `threshold`, recording it when enabled
    pub fn log_slow_query(&self, name: &str, elapsed: Duration, threshold: Duration) {
        if elapsed <= threshold {
            return;
        }
        warn!(
            "Slow query detected: {} took {:.2}s (threshold: {}s)",
            name,
            elapsed.as_secs_f64(),
            threshold.as_secs_f64()
        );
        if self.enabled {
            self.recorder
                .record(&format!("{SLOW_QUERY_PREFIX}{name}"), elapsed, true);
        }
    }

    fn start(&self, name: String) -> BlockTimer<'_> {
        if let Some(sampler) = &self.sampler {
            sampler.maybe_sample();
        }
        let memory_before = self.process_memory_mb();
        BlockTimer {
            active: Some(ActiveTimer {
                profiler: self,
                name,
                start: self.clock.now(),
                memory_before,
            }),
        }
    }

    fn process_memory_mb(&self) -> Option<f64> {
        if !self.track_memory {
            return None;
        }
        self.sampler.as_ref()?.process_memory_mb()
    }

    fn finish_sample(&self, timer: ActiveTimer<'_>, succeeded: bool) {
        let elapsed = self.clock.now().saturating_duration_since(timer.start);
        let memory_delta = match (timer.memory_before, self.process_memory_mb()) {
            (Some(before), Some(after)) => (after - before).max(0.0),
            _ => 0.0,
        };
        self.recorder
            .record_with_memory(&timer.name, elapsed, succeeded, memory_delta);
    }
}

impl std::fmt::Debug for Profiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Profiler")
            .field("enabled", &self.enabled)
            .field("track_memory", &self.track_memory)
            .field("sampling", &self.sampler.is_some())
            .finish_non_exhaustive()
    }
}

struct ActiveTimer<'a> {
    profiler: &'a Profiler,
    name: String,
    start: Instant,
    memory_before: Option<f64>,
}

/// Scoped timer that records exactly one sample
///
/// Dropping the guard records a success, or a failure if the thread is
/// panicking. [`finish`](Self::finish) and [`fail`](Self::fail) record
/// explicitly. An inert guard (profiling disabled) records nothing.
#[must_use = "the sample is recorded when the timer is dropped"]
pub struct BlockTimer<'a> {
    active: Option<ActiveTimer<'a>>,
}

impl BlockTimer<'_> {
    /// Record a success now
    pub fn finish(self) {
        self.complete(true);
    }

    /// Record a failure now
    pub fn fail(self) {
        self.complete(false);
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Time since the block started; zero for an inert timer
    pub fn elapsed(&self) -> Duration {
        self.active
            .as_ref()
            .map(|t| t.profiler.clock.now().saturating_duration_since(t.start))
            .unwrap_or_default()
    }

    fn complete(mut self, succeeded: bool) {
        if let Some(timer) = self.active.take() {
            let profiler = timer.profiler;
            profiler.finish_sample(timer, succeeded);
        }
    }
}

impl Drop for BlockTimer<'_> {
    fn drop(&mut self) {
        if let Some(timer) = self.active.take() {
            let profiler = timer.profiler;
            profiler.finish_sample(timer, !std::thread::panicking());
        }
    }
}
