//! Rate-limited system resource sampling
//!
//! [`SystemSampler::maybe_sample`] is cheap to call from every profiled
//! operation: it does nothing unless `interval` has passed since the last
//! attempt. Readings come from a [`ResourceProbe`]; the production probe is
//! backed by `sysinfo`. Sampling is best effort. A probe failure is logged as
//! a warning and the caller never sees it.

use crate::clock::{Clock, SystemClock};
use crate::config::PerfConfig;
use crate::error::ProbeError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sysinfo::{Disks, Pid, System};
use tracing::{debug, warn};

/// Number of snapshots retained
pub const SNAPSHOT_CAPACITY: usize = 100;

/// Snapshots considered by [`SystemSampler::summary`]
pub const SUMMARY_WINDOW: usize = 10;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Raw resource figures returned by a probe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceReading {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_mb: f64,
    pub disk_usage_percent: f64,
    pub active_threads: usize,
}

/// Source of OS resource readings
pub trait ResourceProbe: Send {
    fn read(&mut self) -> Result<ResourceReading, ProbeError>;

    /// Resident memory of this process in MB, if available
    fn process_memory_mb(&mut self) -> Option<f64>;
}

/// [`ResourceProbe`] backed by `sysinfo`
pub struct SysinfoProbe {
    system: System,
    disks: Disks,
    pid: Option<Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between refreshes; prime the first one
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn disk_usage_percent(&mut self) -> f64 {
        self.disks.refresh();
        let root = self
            .disks
            .list()
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"))
            .or_else(|| self.disks.list().first());

        match root {
            Some(disk) if disk.total_space() > 0 => {
                let used = disk.total_space().saturating_sub(disk.available_space());
                used as f64 / disk.total_space() as f64 * 100.0
            }
            _ => 0.0,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceProbe for SysinfoProbe {
    fn read(&mut self) -> Result<ResourceReading, ProbeError> {
        self.system.refresh_cpu();
        self.system.refresh_memory();

        if self.system.cpus().is_empty() {
            return Err(ProbeError::Unavailable("no CPUs reported".to_string()));
        }
        let total = self.system.total_memory();
        if total == 0 {
            return Err(ProbeError::Unavailable("total memory reported as 0".to_string()));
        }
        let used = self.system.used_memory();

        Ok(ResourceReading {
            cpu_percent: f64::from(self.system.global_cpu_info().cpu_usage()),
            memory_percent: used as f64 / total as f64 * 100.0,
            memory_used_mb: used as f64 / BYTES_PER_MB,
            disk_usage_percent: self.disk_usage_percent(),
            active_threads: active_thread_count(),
        })
    }

    fn process_memory_mb(&mut self) -> Option<f64> {
        let pid = self.pid?;
        if !self.system.refresh_process(pid) {
            return None;
        }
        self.system
            .process(pid)
            .map(|p| p.memory() as f64 / BYTES_PER_MB)
    }
}

/// Threads in this process; 1 (the caller) when the OS does not say
fn active_thread_count() -> usize {
    std::fs::read_dir("/proc/self/task")
        .map(|entries| entries.count())
        .unwrap_or(1)
}

/// One point-in-time resource reading
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub memory_used_mb: f64,
    pub disk_usage_percent: f64,
    pub active_threads: usize,
}

/// Aggregate over the most recent snapshots
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatsSummary {
    pub avg_cpu_percent: f64,
    pub avg_memory_percent: f64,
    pub avg_memory_used_mb: f64,
    pub max_cpu_percent: f64,
    pub max_memory_percent: f64,
    pub current_active_threads: usize,
    pub measurement_count: usize,
    pub time_range_minutes: f64,
}

impl SystemStatsSummary {
    /// Summarize `recent` (oldest first); `None` when empty
    pub fn from_snapshots(recent: &[SystemSnapshot]) -> Option<Self> {
        let first = recent.first()?;
        let last = recent.last()?;
        let n = recent.len() as f64;

        let avg = |f: fn(&SystemSnapshot) -> f64| recent.iter().map(f).sum::<f64>() / n;
        let max = |f: fn(&SystemSnapshot) -> f64| recent.iter().map(f).fold(f64::MIN, f64::max);

        let time_range_minutes = if recent.len() > 1 {
            (last.timestamp - first.timestamp).num_milliseconds() as f64 / 60_000.0
        } else {
            0.0
        };

        Some(Self {
            avg_cpu_percent: avg(|s| s.cpu_percent),
            avg_memory_percent: avg(|s| s.memory_percent),
            avg_memory_used_mb: avg(|s| s.memory_used_mb),
            max_cpu_percent: max(|s| s.cpu_percent),
            max_memory_percent: max(|s| s.memory_percent),
            current_active_threads: last.active_threads,
            measurement_count: recent.len(),
            time_range_minutes,
        })
    }
}

struct SamplerInner {
    probe: Box<dyn ResourceProbe>,
    snapshots: VecDeque<SystemSnapshot>,
    last_attempt: Option<Instant>,
}

/// Bounded, rate-limited resource snapshot ring
pub struct SystemSampler {
    inner: Mutex<SamplerInner>,
    interval: Duration,
    enabled: bool,
    clock: Arc<dyn Clock>,
}

impl SystemSampler {
    pub fn new(probe: Box<dyn ResourceProbe>, interval: Duration, enabled: bool) -> Self {
        Self::with_clock(probe, interval, enabled, Arc::new(SystemClock))
    }

    pub fn with_clock(
        probe: Box<dyn ResourceProbe>,
        interval: Duration,
        enabled: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Mutex::new(SamplerInner {
                probe,
                snapshots: VecDeque::with_capacity(SNAPSHOT_CAPACITY),
                last_attempt: None,
            }),
            interval,
            enabled,
            clock,
        }
    }

    /// Sampler over the real OS, configured from `config`
    pub fn from_config(config: &PerfConfig, clock: Arc<dyn Clock>) -> Self {
        Self::with_clock(
            Box::new(SysinfoProbe::new()),
            config.resource_interval(),
            config.monitor_system_resources,
            clock,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Take a snapshot if the interval has elapsed; returns whether one was taken
    ///
    /// The first call always attempts a reading. A failed reading still
    /// starts a new interval, so a broken probe warns at most once per
    /// interval.
    pub fn maybe_sample(&self) -> bool {
        if !self.enabled {
            return false;
        }

        let now = self.clock.now();
        let mut inner = self.inner.lock();
        if let Some(last) = inner.last_attempt {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        inner.last_attempt = Some(now);

        match inner.probe.read() {
            Ok(reading) => {
                if inner.snapshots.len() == SNAPSHOT_CAPACITY {
                    inner.snapshots.pop_front();
                }
                inner.snapshots.push_back(SystemSnapshot {
                    timestamp: self.clock.wall(),
                    cpu_percent: reading.cpu_percent,
                    memory_percent: reading.memory_percent,
                    memory_used_mb: reading.memory_used_mb,
                    disk_usage_percent: reading.disk_usage_percent,
                    active_threads: reading.active_threads,
                });
                debug!(
                    cpu = reading.cpu_percent,
                    memory = reading.memory_percent,
                    "system snapshot recorded"
                );
                true
            }
            Err(e) => {
                warn!("Failed to collect system stats: {}", e);
                false
            }
        }
    }

    /// Resident memory of this process, if the probe can tell
    pub fn process_memory_mb(&self) -> Option<f64> {
        self.inner.lock().probe.process_memory_mb()
    }

    /// All retained snapshots, oldest first
    pub fn snapshots(&self) -> Vec<SystemSnapshot> {
        self.inner.lock().snapshots.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<SystemSnapshot> {
        self.inner.lock().snapshots.back().cloned()
    }

    pub fn snapshot_count(&self) -> usize {
        self.inner.lock().snapshots.len()
    }

    /// Summary over the last [`SUMMARY_WINDOW`] snapshots
    pub fn summary(&self) -> Option<SystemStatsSummary> {
        let inner = self.inner.lock();
        let skip = inner.snapshots.len().saturating_sub(SUMMARY_WINDOW);
        let recent: Vec<SystemSnapshot> = inner.snapshots.iter().skip(skip).cloned().collect();
        drop(inner);
        SystemStatsSummary::from_snapshots(&recent)
    }

    /// Drop all snapshots and allow an immediate new sample
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.snapshots.clear();
        inner.last_attempt = None;
    }
}

impl std::fmt::Debug for SystemSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSampler")
            .field("interval", &self.interval)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
