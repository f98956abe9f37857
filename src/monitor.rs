//! Composition root
//!
//! [`PerformanceMonitor`] builds one cache, recorder, sampler and profiler
//! from a [`PerfConfig`] and shares them through `Arc` handles. Components
//! that need instrumentation take a monitor (or the specific handle) by
//! reference instead of reaching for global state.

use crate::clock::{Clock, SystemClock};
use crate::config::PerfConfig;
use crate::error::ConfigError;
use crate::memoize::cached_call;
use crate::profiler::Profiler;
use crate::recorder::CallRecorder;
use crate::report::Reporter;
use crate::sampler::{ResourceProbe, SysinfoProbe, SystemSampler};
use crate::ttl_cache::TtlCache;
use std::sync::Arc;

/// Shared instrumentation for one process
///
/// `V` is the type of value held by the shared cache.
pub struct PerformanceMonitor<V> {
    config: PerfConfig,
    cache: Arc<TtlCache<String, V>>,
    recorder: Arc<CallRecorder>,
    sampler: Arc<SystemSampler>,
    profiler: Arc<Profiler>,
    reporter: Arc<Reporter>,
}

impl<V: Clone> PerformanceMonitor<V> {
    /// Build against the real clock and OS probe
    pub fn new(config: PerfConfig) -> Result<Self, ConfigError> {
        Self::with_parts(config, Arc::new(SystemClock), Box::new(SysinfoProbe::new()))
    }

    /// Build with an explicit clock and resource probe
    pub fn with_parts(
        config: PerfConfig,
        clock: Arc<dyn Clock>,
        probe: Box<dyn ResourceProbe>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache = Arc::new(TtlCache::from_config(&config, clock.clone())?);
        let recorder = Arc::new(CallRecorder::with_clock(
            config.slow_threshold(),
            clock.clone(),
        ));
        let sampler = Arc::new(SystemSampler::with_clock(
            probe,
            config.resource_interval(),
            config.monitor_system_resources,
            clock.clone(),
        ));
        let profiler = Arc::new(
            Profiler::new(recorder.clone(), config.enable_profiling)
                .with_sampler(sampler.clone())
                .with_clock(clock.clone())
                .with_memory_tracking(config.track_memory_usage),
        );
        let reporter = Arc::new(
            Reporter::new(recorder.clone(), sampler.clone(), config.clone()).with_clock(clock),
        );

        Ok(Self {
            config,
            cache,
            recorder,
            sampler,
            profiler,
            reporter,
        })
    }

    pub fn config(&self) -> &PerfConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TtlCache<String, V>> {
        &self.cache
    }

    pub fn recorder(&self) -> &Arc<CallRecorder> {
        &self.recorder
    }

    pub fn sampler(&self) -> &Arc<SystemSampler> {
        &self.sampler
    }

    pub fn profiler(&self) -> &Arc<Profiler> {
        &self.profiler
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    /// Serve `key` from the cache, or run `op` profiled as `name` and cache its `Ok`
    pub fn cached_profiled<E, F>(&self, key: &str, name: &str, op: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        cached_call(&self.cache, key.to_string(), || self.profiler.profile(name, op))
    }

    /// Clear the cache, stats and snapshots
    pub fn reset(&self) {
        self.cache.clear();
        self.recorder.reset();
        self.sampler.clear();
    }
}

impl<V> std::fmt::Debug for PerformanceMonitor<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("config", &self.config)
            .field("profiler", &self.profiler)
            .finish_non_exhaustive()
    }
}
