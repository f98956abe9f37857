//! Configuration loading from the process environment
//!
//! These tests mutate process-wide environment variables, so every test that
//! touches them runs under `#[serial]`.

use perfcache::config::{parse_bool, PerfConfig};
use perfcache::error::ConfigError;
use serial_test::serial;
use std::collections::HashMap;
use std::env;

const VARS: [&str; 12] = [
    "API_CACHE_SIZE",
    "API_CACHE_TTL_MINUTES",
    "ENABLE_PROFILING",
    "SLOW_FUNCTION_THRESHOLD",
    "MONITOR_SYSTEM_RESOURCES",
    "RESOURCE_CHECK_INTERVAL",
    "TRACK_MEMORY_USAGE",
    "MIN_WORKERS",
    "MAX_WORKERS",
    "MAX_WORKERS_MULTIPLIER",
    "LARGE_BATCH_THRESHOLD",
    "PERFORMANCE_LOG_LEVEL",
];

/// Clears every config variable on creation and again on drop
struct EnvGuard;

impl EnvGuard {
    fn new() -> Self {
        Self::clear();
        EnvGuard
    }

    fn set(&self, key: &str, value: &str) {
        env::set_var(key, value);
    }

    fn clear() {
        for var in VARS {
            env::remove_var(var);
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        Self::clear();
    }
}

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
#[serial]
fn test_defaults_when_environment_empty() {
    let _env = EnvGuard::new();
    let config = PerfConfig::from_env().unwrap();

    assert_eq!(config, PerfConfig::default());
    assert_eq!(config.api_cache_size, 256);
    assert_eq!(config.api_cache_ttl_minutes, 10);
    assert!(config.enable_profiling);
    assert_eq!(config.slow_function_threshold, 1.0);
    assert!(config.monitor_system_resources);
    assert_eq!(config.resource_check_interval, 60);
    assert!(!config.track_memory_usage);
    assert_eq!((config.min_workers, config.max_workers), (2, 16));
    assert_eq!(config.large_batch_threshold, 1000);
    assert_eq!(config.log_level, "info");
}

#[test]
#[serial]
fn test_environment_overrides_defaults() {
    let env = EnvGuard::new();
    env.set("API_CACHE_SIZE", "64");
    env.set("API_CACHE_TTL_MINUTES", "3");
    env.set("ENABLE_PROFILING", "off");
    env.set("SLOW_FUNCTION_THRESHOLD", "0.25");
    env.set("TRACK_MEMORY_USAGE", "YES");
    env.set("PERFORMANCE_LOG_LEVEL", "DEBUG");

    let config = PerfConfig::from_env().unwrap();
    assert_eq!(config.api_cache_size, 64);
    assert_eq!(config.cache_ttl().as_secs(), 180);
    assert!(!config.enable_profiling);
    assert_eq!(config.slow_threshold().as_millis(), 250);
    assert!(config.track_memory_usage);
    assert_eq!(config.log_level, "debug");
}

#[test]
#[serial]
fn test_malformed_number_fails_fast() {
    let env = EnvGuard::new();
    env.set("API_CACHE_SIZE", "lots");

    let err = PerfConfig::from_env().unwrap_err();
    match err {
        ConfigError::InvalidValue { var, value, .. } => {
            assert_eq!(var, "API_CACHE_SIZE");
            assert_eq!(value, "lots");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
#[serial]
fn test_malformed_bool_fails_fast() {
    let env = EnvGuard::new();
    env.set("MONITOR_SYSTEM_RESOURCES", "maybe");

    let err = PerfConfig::from_env().unwrap_err();
    assert!(err.to_string().contains("MONITOR_SYSTEM_RESOURCES"));
}

#[test]
fn test_out_of_range_values_rejected() {
    for pairs in [
        vec![("API_CACHE_SIZE", "0")],
        vec![("API_CACHE_TTL_MINUTES", "0")],
        vec![("SLOW_FUNCTION_THRESHOLD", "-1")],
        vec![("SLOW_FUNCTION_THRESHOLD", "NaN")],
        vec![("MIN_WORKERS", "0")],
        vec![("MIN_WORKERS", "8"), ("MAX_WORKERS", "4")],
        vec![("MAX_WORKERS_MULTIPLIER", "0")],
    ] {
        let result = PerfConfig::from_lookup(lookup_from(&pairs));
        assert!(result.is_err(), "{pairs:?} should be rejected");
    }
}

#[test]
fn test_parse_bool_spellings() {
    for truthy in ["true", "1", "yes", "on", "TRUE", " On "] {
        assert_eq!(parse_bool(truthy), Some(true), "{truthy}");
    }
    for falsy in ["false", "0", "no", "off", "No"] {
        assert_eq!(parse_bool(falsy), Some(false), "{falsy}");
    }
    assert_eq!(parse_bool("enabled"), None);
    assert_eq!(parse_bool(""), None);
}

#[test]
fn test_optimal_workers_bounds() {
    let config = PerfConfig::from_lookup(lookup_from(&[
        ("MIN_WORKERS", "3"),
        ("MAX_WORKERS", "6"),
    ]))
    .unwrap();

    for batch in [None, Some(0), Some(50), Some(500), Some(5000)] {
        let workers = config.optimal_workers(batch);
        assert!((3..=6).contains(&workers), "{batch:?} -> {workers}");
    }
    assert!(config.optimal_workers(Some(5000)) >= config.optimal_workers(None));
    assert!(config.optimal_workers(Some(10)) <= config.optimal_workers(None));
}

#[test]
fn test_large_batch_threshold() {
    let config = PerfConfig::from_lookup(lookup_from(&[("LARGE_BATCH_THRESHOLD", "10")])).unwrap();
    assert!(!config.is_large_batch(10));
    assert!(config.is_large_batch(11));
}
