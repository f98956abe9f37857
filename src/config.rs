//! Performance configuration loaded from environment variables
//!
//! All settings have documented defaults. A variable that is present but
//! malformed is a hard error: the process should refuse to start rather than
//! silently fall back to a default the operator did not ask for.

use crate::error::ConfigError;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Batches smaller than this get fewer workers than the CPU-derived base
const SMALL_BATCH_THRESHOLD: usize = 100;

/// Active configuration for the cache, profiler and sampler
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfConfig {
    /// Maximum number of entries in the shared cache
    pub api_cache_size: usize,
    /// Cache time-to-live in minutes
    pub api_cache_ttl_minutes: u64,
    /// Whether profiled operations are recorded at all
    pub enable_profiling: bool,
    /// Calls slower than this (seconds) land in the slow-call ring
    pub slow_function_threshold: f64,
    /// Whether the resource sampler takes snapshots
    pub monitor_system_resources: bool,
    /// Minimum seconds between two resource snapshots
    pub resource_check_interval: u64,
    /// Measure process memory before and after each profiled call
    pub track_memory_usage: bool,
    pub min_workers: usize,
    pub max_workers: usize,
    /// Workers per CPU core
    pub max_workers_multiplier: f64,
    /// Batch size above which a workload is considered large
    pub large_batch_threshold: usize,
    /// Default `tracing` filter directive
    pub log_level: String,
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            api_cache_size: 256,
            api_cache_ttl_minutes: 10,
            enable_profiling: true,
            slow_function_threshold: 1.0,
            monitor_system_resources: true,
            resource_check_interval: 60,
            track_memory_usage: false,
            min_workers: 2,
            max_workers: 16,
            max_workers_multiplier: 1.0,
            large_batch_threshold: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl PerfConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// # Example
    /// ```
    /// use perfcache::config::PerfConfig;
    ///
    /// let config = PerfConfig::from_lookup(|key| match key {
    ///     "API_CACHE_SIZE" => Some("32".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.api_cache_size, 32);
    /// assert!(config.enable_profiling);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            api_cache_size: parse_var(&lookup, "API_CACHE_SIZE", defaults.api_cache_size)?,
            api_cache_ttl_minutes: parse_var(
                &lookup,
                "API_CACHE_TTL_MINUTES",
                defaults.api_cache_ttl_minutes,
            )?,
            enable_profiling: bool_var(&lookup, "ENABLE_PROFILING", defaults.enable_profiling)?,
            slow_function_threshold: parse_var(
                &lookup,
                "SLOW_FUNCTION_THRESHOLD",
                defaults.slow_function_threshold,
            )?,
            monitor_system_resources: bool_var(
                &lookup,
                "MONITOR_SYSTEM_RESOURCES",
                defaults.monitor_system_resources,
            )?,
            resource_check_interval: parse_var(
                &lookup,
                "RESOURCE_CHECK_INTERVAL",
                defaults.resource_check_interval,
            )?,
            track_memory_usage: bool_var(
                &lookup,
                "TRACK_MEMORY_USAGE",
                defaults.track_memory_usage,
            )?,
            min_workers: parse_var(&lookup, "MIN_WORKERS", defaults.min_workers)?,
            max_workers: parse_var(&lookup, "MAX_WORKERS", defaults.max_workers)?,
            max_workers_multiplier: parse_var(
                &lookup,
                "MAX_WORKERS_MULTIPLIER",
                defaults.max_workers_multiplier,
            )?,
            large_batch_threshold: parse_var(
                &lookup,
                "LARGE_BATCH_THRESHOLD",
                defaults.large_batch_threshold,
            )?,
            log_level: lookup("PERFORMANCE_LOG_LEVEL")
                .map(|v| v.trim().to_lowercase())
                .unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field and range constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_cache_size == 0 {
            return Err(ConfigError::invalid("API_CACHE_SIZE", "0", "must be > 0"));
        }
        if self.api_cache_ttl_minutes == 0 {
            return Err(ConfigError::invalid("API_CACHE_TTL_MINUTES", "0", "must be > 0"));
        }
        if Duration::try_from_secs_f64(self.slow_function_threshold).is_err() {
            return Err(ConfigError::invalid(
                "SLOW_FUNCTION_THRESHOLD",
                &self.slow_function_threshold.to_string(),
                "must be a finite number of seconds >= 0",
            ));
        }
        if self.min_workers == 0 {
            return Err(ConfigError::invalid("MIN_WORKERS", "0", "must be >= 1"));
        }
        if self.max_workers < self.min_workers {
            return Err(ConfigError::OutOfRange(format!(
                "MAX_WORKERS ({}) must be >= MIN_WORKERS ({})",
                self.max_workers, self.min_workers
            )));
        }
        if !self.max_workers_multiplier.is_finite() || self.max_workers_multiplier <= 0.0 {
            return Err(ConfigError::invalid(
                "MAX_WORKERS_MULTIPLIER",
                &self.max_workers_multiplier.to_string(),
                "must be a finite number > 0",
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.api_cache_ttl_minutes.saturating_mul(60))
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_secs_f64(self.slow_function_threshold)
    }

    pub fn resource_interval(&self) -> Duration {
        Duration::from_secs(self.resource_check_interval)
    }

    pub fn is_large_batch(&self, size: usize) -> bool {
        size > self.large_batch_threshold
    }

    /// Number of workers for a batch, derived from the CPU count
    pub fn optimal_workers(&self, batch_size: Option<usize>) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        self.workers_for(cpus, batch_size)
    }

    fn workers_for(&self, cpus: usize, batch_size: Option<usize>) -> usize {
        let scaled = (cpus as f64 * self.max_workers_multiplier) as usize;
        let base = scaled.clamp(self.min_workers, self.max_workers);

        match batch_size {
            Some(size) if self.is_large_batch(size) => (base + 2).min(self.max_workers),
            Some(size) if size < SMALL_BATCH_THRESHOLD => {
                base.saturating_sub(2).max(self.min_workers)
            }
            _ => base,
        }
    }

    /// Log the active settings at info level
    pub fn log_configuration(&self) {
        info!("=== Performance Configuration ===");
        info!("API Cache Size: {}", self.api_cache_size);
        info!("API Cache TTL: {} minutes", self.api_cache_ttl_minutes);
        info!("Profiling Enabled: {}", self.enable_profiling);
        info!("Slow Function Threshold: {}s", self.slow_function_threshold);
        info!(
            "System Monitoring: {} (every {}s)",
            self.monitor_system_resources, self.resource_check_interval
        );
        info!("Workers: {}..={}", self.min_workers, self.max_workers);
        info!("================================");
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::invalid(var, &raw, e.to_string())),
    }
}

fn bool_var<F>(lookup: &F, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => parse_bool(&raw)
            .ok_or_else(|| ConfigError::invalid(var, &raw, "expected true/false, 1/0, yes/no or on/off")),
    }
}

/// Parse a boolean flag value (case-insensitive)
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
