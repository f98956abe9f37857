//! Per-operation call statistics
//!
//! [`CallRecorder`] aggregates every profiled sample into a running
//! [`FunctionStats`] per operation name, and keeps the most recent slow calls
//! in a bounded FIFO ring. Memory use is bounded by the number of distinct
//! names plus [`SLOW_CALL_CAPACITY`] events; individual samples are folded in
//! and discarded.

use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Number of slow-call events retained
pub const SLOW_CALL_CAPACITY: usize = 50;

/// Running statistics for one operation name
///
/// Times are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStats {
    pub name: String,
    pub call_count: u64,
    pub total_time: f64,
    pub avg_time: f64,
    pub min_time: f64,
    pub max_time: f64,
    pub success_count: u64,
    pub error_count: u64,
    /// Last positive process-memory delta seen around a call (MB)
    pub memory_usage_mb: f64,
    pub last_called: DateTime<Utc>,
}

impl FunctionStats {
    fn first(name: &str, elapsed: f64, succeeded: bool, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            call_count: 1,
            total_time: elapsed,
            avg_time: elapsed,
            min_time: elapsed,
            max_time: elapsed,
            success_count: u64::from(succeeded),
            error_count: u64::from(!succeeded),
            memory_usage_mb: 0.0,
            last_called: now,
        }
    }

    fn absorb(&mut self, elapsed: f64, succeeded: bool, now: DateTime<Utc>) {
        self.call_count += 1;
        self.total_time += elapsed;
        self.avg_time = self.total_time / self.call_count as f64;
        self.min_time = self.min_time.min(elapsed);
        self.max_time = self.max_time.max(elapsed);
        // Float accumulation can drift the mean a hair outside [min, max]
        self.avg_time = self.avg_time.clamp(self.min_time, self.max_time);
        self.last_called = now;

        if succeeded {
            self.success_count += 1;
        } else {
            self.error_count += 1;
        }
    }
}

/// Numeric [`FunctionStats`] field used for ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatField {
    #[default]
    TotalTime,
    AvgTime,
    MinTime,
    MaxTime,
    CallCount,
    SuccessCount,
    ErrorCount,
    MemoryUsageMb,
}

impl StatField {
    pub const ALL: [StatField; 8] = [
        StatField::TotalTime,
        StatField::AvgTime,
        StatField::MinTime,
        StatField::MaxTime,
        StatField::CallCount,
        StatField::SuccessCount,
        StatField::ErrorCount,
        StatField::MemoryUsageMb,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatField::TotalTime => "total_time",
            StatField::AvgTime => "avg_time",
            StatField::MinTime => "min_time",
            StatField::MaxTime => "max_time",
            StatField::CallCount => "call_count",
            StatField::SuccessCount => "success_count",
            StatField::ErrorCount => "error_count",
            StatField::MemoryUsageMb => "memory_usage_mb",
        }
    }

    /// Read this field from `stats` as a float
    pub fn value(self, stats: &FunctionStats) -> f64 {
        match self {
            StatField::TotalTime => stats.total_time,
            StatField::AvgTime => stats.avg_time,
            StatField::MinTime => stats.min_time,
            StatField::MaxTime => stats.max_time,
            StatField::CallCount => stats.call_count as f64,
            StatField::SuccessCount => stats.success_count as f64,
            StatField::ErrorCount => stats.error_count as f64,
            StatField::MemoryUsageMb => stats.memory_usage_mb,
        }
    }
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        StatField::ALL
            .into_iter()
            .find(|field| field.as_str() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = StatField::ALL.iter().map(|f| f.as_str()).collect();
                format!("unknown stat field '{}' (expected one of: {})", s, names.join(", "))
            })
    }
}

/// A single call that exceeded the slow threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowCallEvent {
    pub name: String,
    /// Seconds
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct RecorderInner {
    /// Stats in first-seen order
    stats: Vec<FunctionStats>,
    index: HashMap<String, usize>,
    slow_calls: VecDeque<SlowCallEvent>,
}

/// Thread-safe aggregator of profiled samples
pub struct CallRecorder {
    inner: Mutex<RecorderInner>,
    slow_threshold: Duration,
    clock: Arc<dyn Clock>,
}

impl CallRecorder {
    pub fn new(slow_threshold: Duration) -> Self {
        Self::with_clock(slow_threshold, Arc::new(SystemClock))
    }

    pub fn with_clock(slow_threshold: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(RecorderInner::default()),
            slow_threshold,
            clock,
        }
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Fold one sample into the stats for `name`
    pub fn record(&self, name: &str, elapsed: Duration, succeeded: bool) {
        self.record_with_memory(name, elapsed, succeeded, 0.0);
    }

    /// Like [`record`](Self::record), also storing a positive memory delta
    pub fn record_with_memory(
        &self,
        name: &str,
        elapsed: Duration,
        succeeded: bool,
        memory_delta_mb: f64,
    ) {
        let now = self.clock.wall();
        let secs = elapsed.as_secs_f64();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let existing = inner.index.get(name).copied();
        let stats = match existing {
            Some(i) => {
                let stats = &mut inner.stats[i];
                stats.absorb(secs, succeeded, now);
                stats
            }
            None => {
                inner.index.insert(name.to_string(), inner.stats.len());
                inner.stats.push(FunctionStats::first(name, secs, succeeded, now));
                let last = inner.stats.len() - 1;
                &mut inner.stats[last]
            }
        };
        if memory_delta_mb > 0.0 {
            stats.memory_usage_mb = memory_delta_mb;
        }

        if elapsed > self.slow_threshold {
            if inner.slow_calls.len() == SLOW_CALL_CAPACITY {
                inner.slow_calls.pop_front();
            }
            inner.slow_calls.push_back(SlowCallEvent {
                name: name.to_string(),
                execution_time: secs,
                timestamp: now,
            });
            debug!(name, seconds = secs, "slow call recorded");
        }
    }

    /// Stats for one name, if it has been recorded
    pub fn function_stats(&self, name: &str) -> Option<FunctionStats> {
        let inner = self.inner.lock();
        inner.index.get(name).map(|&i| inner.stats[i].clone())
    }

    /// All stats, descending by `field`; ties keep first-seen order
    pub fn stats_sorted_by(&self, field: StatField) -> Vec<FunctionStats> {
        let mut list = self.inner.lock().stats.clone();
        list.sort_by(|a, b| field.value(b).total_cmp(&field.value(a)));
        list
    }

    /// Retained slow calls above `threshold` (default: the configured one),
    /// slowest first
    pub fn slow_calls(&self, threshold: Option<Duration>) -> Vec<SlowCallEvent> {
        let threshold = threshold.unwrap_or(self.slow_threshold).as_secs_f64();
        let mut calls: Vec<SlowCallEvent> = self
            .inner
            .lock()
            .slow_calls
            .iter()
            .filter(|e| e.execution_time > threshold)
            .cloned()
            .collect();
        calls.sort_by(|a, b| b.execution_time.total_cmp(&a.execution_time));
        calls
    }

    pub fn function_count(&self) -> usize {
        self.inner.lock().stats.len()
    }

    /// Number of events currently held in the slow-call ring
    pub fn slow_call_count(&self) -> usize {
        self.inner.lock().slow_calls.len()
    }

    /// Slow-call ring contents, oldest first
    pub fn slow_call_ring(&self) -> Vec<SlowCallEvent> {
        self.inner.lock().slow_calls.iter().cloned().collect()
    }

    /// Forget every stat and slow call
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.stats.clear();
        inner.index.clear();
        inner.slow_calls.clear();
        drop(inner);
        info!("Performance statistics reset");
    }
}

impl fmt::Debug for CallRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallRecorder")
            .field("slow_threshold", &self.slow_threshold)
            .field("functions", &self.function_count())
            .finish_non_exhaustive()
    }
}
