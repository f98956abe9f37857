//! perfcache - Instrumented TTL cache and call-site profiler
//!
//! This library provides a time-windowed LRU cache with lazy expiration, a
//! profiler that aggregates per-operation timing statistics in bounded
//! memory, a rate-limited system resource sampler, and reporting views with a
//! JSON export document. [`monitor::PerformanceMonitor`] wires one shared
//! instance of each together from a [`config::PerfConfig`].

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod memoize;
pub mod monitor;
pub mod profiler;
pub mod recorder;
pub mod report;
pub mod sampler;
pub mod ttl_cache;
pub mod workload;
