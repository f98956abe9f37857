//! Reporting views and the JSON export document
//!
//! Everything here is read-only over the recorder and sampler, so it is safe
//! to call from a rendering or ops layer at any time. Views degrade to empty
//! collections (and `{}` for the system summary) when nothing has been
//! collected yet.

use crate::clock::{Clock, SystemClock};
use crate::config::PerfConfig;
use crate::error::ExportError;
use crate::recorder::{CallRecorder, FunctionStats, SlowCallEvent, StatField};
use crate::sampler::{SystemSampler, SystemStatsSummary};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Functions listed by [`Reporter::log_performance_summary`]
const TOP_FUNCTIONS: usize = 5;

/// Thresholds and sizes active when an export was taken
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfiguration {
    pub slow_function_threshold: f64,
    pub api_cache_size: usize,
    pub api_cache_ttl_seconds: u64,
    pub max_workers: usize,
    pub profiling_enabled: bool,
    pub monitor_system_resources: bool,
    pub resource_check_interval: u64,
}

impl From<&PerfConfig> for ExportConfiguration {
    fn from(config: &PerfConfig) -> Self {
        Self {
            slow_function_threshold: config.slow_function_threshold,
            api_cache_size: config.api_cache_size,
            api_cache_ttl_seconds: config.cache_ttl().as_secs(),
            max_workers: config.max_workers,
            profiling_enabled: config.enable_profiling,
            monitor_system_resources: config.monitor_system_resources,
            resource_check_interval: config.resource_check_interval,
        }
    }
}

/// Root export document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub export_timestamp: DateTime<Utc>,
    pub function_stats: Vec<FunctionStats>,
    pub slow_functions: Vec<SlowCallEvent>,
    #[serde(serialize_with = "summary_or_empty")]
    pub system_stats_summary: Option<SystemStatsSummary>,
    pub configuration: ExportConfiguration,
}

/// Serialize a missing summary as `{}` rather than `null`
fn summary_or_empty<S>(summary: &Option<SystemStatsSummary>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match summary {
        Some(summary) => summary.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

/// Read-only view over the recorder and sampler
pub struct Reporter {
    recorder: Arc<CallRecorder>,
    sampler: Arc<SystemSampler>,
    config: PerfConfig,
    clock: Arc<dyn Clock>,
}

impl Reporter {
    pub fn new(recorder: Arc<CallRecorder>, sampler: Arc<SystemSampler>, config: PerfConfig) -> Self {
        Self {
            recorder,
            sampler,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Function stats, descending by `field`
    pub fn function_stats_summary(&self, field: StatField) -> Vec<FunctionStats> {
        self.recorder.stats_sorted_by(field)
    }

    pub fn system_stats_summary(&self) -> Option<SystemStatsSummary> {
        self.sampler.summary()
    }

    /// Assemble the export document in memory
    pub fn build_export(&self) -> ExportDocument {
        ExportDocument {
            export_timestamp: self.clock.wall(),
            function_stats: self.function_stats_summary(StatField::TotalTime),
            slow_functions: self.recorder.slow_calls(None),
            system_stats_summary: self.system_stats_summary(),
            configuration: ExportConfiguration::from(&self.config),
        }
    }

    /// Write the export document as pretty JSON to any sink
    pub fn write_snapshot<W: Write>(&self, writer: W) -> Result<(), ExportError> {
        serde_json::to_writer_pretty(writer, &self.build_export())?;
        Ok(())
    }

    /// Write the export document to `path`
    ///
    /// Failures are logged and returned; callers are free to ignore them.
    pub fn export_snapshot(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        let path = path.as_ref();
        let result = self.export_to_file(path);
        match &result {
            Ok(()) => info!("Performance metrics exported to {}", path.display()),
            Err(e) => error!("Failed to export metrics: {}", e),
        }
        result
    }

    fn export_to_file(&self, path: &Path) -> Result<(), ExportError> {
        let io_err = |source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        self.write_snapshot(&mut writer)?;
        writer.flush().map_err(io_err)
    }

    /// Log function and system highlights at info level
    pub fn log_performance_summary(&self) {
        if self.recorder.function_count() == 0 {
            info!("No performance data available");
            return;
        }

        info!("=== Performance Summary ===");
        info!("Total functions monitored: {}", self.recorder.function_count());
        info!("Slow function calls detected: {}", self.recorder.slow_call_count());

        info!("Top {} functions by total execution time:", TOP_FUNCTIONS);
        for (i, func) in self
            .function_stats_summary(StatField::TotalTime)
            .iter()
            .take(TOP_FUNCTIONS)
            .enumerate()
        {
            info!(
                "  {}. {}: {:.2}s total, {} calls, {:.3}s avg",
                i + 1,
                func.name,
                func.total_time,
                func.call_count,
                func.avg_time
            );
        }

        if let Some(sys) = self.system_stats_summary() {
            info!(
                "System - Avg CPU: {:.1}%, Avg Memory: {:.1}%, Active Threads: {}",
                sys.avg_cpu_percent, sys.avg_memory_percent, sys.current_active_threads
            );
        }
        info!("==========================");
    }

    /// Print a function timing table to stderr, descending by `field`
    pub fn print_summary(&self, field: StatField) {
        let stats = self.function_stats_summary(field);
        if stats.is_empty() {
            eprintln!("\nNo function profiling data collected.");
            return;
        }

        eprintln!("\n╔════════════════════════════════════════════════════════════════════════════════╗");
        eprintln!("║  {:<78}║", format!("Function Timing Summary (sorted by {})", field));
        eprintln!("╚════════════════════════════════════════════════════════════════════════════════╝");
        eprintln!();
        eprintln!(
            "{:<40} {:>8} {:>8} {:>12} {:>12} {:>12}",
            "Function", "Calls", "Errors", "Total Time", "Avg Time", "Max Time"
        );
        eprintln!("{}", "─".repeat(97));

        for func in &stats {
            eprintln!(
                "{:<40} {:>8} {:>8} {:>11.6}s {:>11.6}s {:>11.6}s",
                func.name,
                func.call_count,
                func.error_count,
                func.total_time,
                func.avg_time,
                func.max_time
            );
        }
        eprintln!("{}", "─".repeat(97));

        let slow = self.recorder.slow_calls(None);
        if !slow.is_empty() {
            eprintln!(
                "\nSlow calls (> {:.3}s): {}",
                self.recorder.slow_threshold().as_secs_f64(),
                slow.len()
            );
            for event in slow.iter().take(TOP_FUNCTIONS) {
                eprintln!(
                    "  {:<40} {:>11.6}s  at {}",
                    event.name,
                    event.execution_time,
                    event.timestamp.to_rfc3339()
                );
            }
        }

        if let Some(sys) = self.system_stats_summary() {
            eprintln!(
                "\nSystem: avg CPU {:.1}%, avg memory {:.1}% ({:.0} MB), {} threads over {} samples",
                sys.avg_cpu_percent,
                sys.avg_memory_percent,
                sys.avg_memory_used_mb,
                sys.current_active_threads,
                sys.measurement_count
            );
        }
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
