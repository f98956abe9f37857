//! CLI argument parsing for perfcache

use crate::recorder::StatField;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Where the end-of-run report goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary table on stderr (default)
    Text,
    /// Export document as JSON on stdout
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "perfcache")]
#[command(version)]
#[command(
    about = "Drive a synthetic workload through an instrumented TTL cache and profiler",
    long_about = None
)]
pub struct Cli {
    /// Total number of requests to issue
    #[arg(short = 'n', long = "iterations", value_name = "N", default_value = "200")]
    pub iterations: u64,

    /// Number of distinct cache keys the requests cycle through
    #[arg(short = 'k', long = "keys", value_name = "K", default_value = "32")]
    pub keys: u64,

    /// Worker threads (default: sized from CPU count and MIN/MAX_WORKERS)
    #[arg(short = 'w', long = "workers", value_name = "W")]
    pub workers: Option<usize>,

    /// Simulated cost of one cache miss, in milliseconds
    #[arg(long = "work-ms", value_name = "MS", default_value = "5")]
    pub work_ms: u64,

    /// Make every N-th fetch fail (0 disables failures)
    #[arg(long = "fail-every", value_name = "N", default_value = "0")]
    pub fail_every: u64,

    /// Field used to order the function stats table
    #[arg(long = "sort-by", value_name = "FIELD", default_value = "total_time")]
    pub sort_by: StatField,

    /// Report format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write the JSON export document to FILE
    #[arg(short = 'o', long = "export", value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Disable profiling regardless of ENABLE_PROFILING
    #[arg(long = "no-profile")]
    pub no_profile: bool,

    /// Print cache hit statistics after the run
    #[arg(long = "cache-stats")]
    pub cache_stats: bool,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
