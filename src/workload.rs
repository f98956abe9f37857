//! Synthetic multi-threaded workload
//!
//! Drives the shared cache and profiler the way a service would: a pool of
//! workers pulls request indices from a channel, serves each from the cache
//! when possible and otherwise runs a (simulated) expensive fetch as a
//! profiled operation. Used by the `perfcache` binary and its tests.

use crate::error::WorkloadError;
use crate::monitor::PerformanceMonitor;
use crossbeam::channel;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Name under which simulated fetches are profiled
pub const FETCH_OPERATION: &str = "fetch_item";

/// Shape of a synthetic run
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadPlan {
    /// Total number of requests
    pub iterations: u64,
    /// Distinct cache keys the requests cycle through
    pub keys: u64,
    pub workers: usize,
    /// Simulated cost of one fetch
    pub work: Duration,
    /// Every n-th fetch fails (0 = never)
    pub fail_every: u64,
}

/// Counters from a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadOutcome {
    /// Requests answered with a value
    pub served: u64,
    /// Requests whose fetch failed
    pub failed: u64,
    /// Fetches actually executed (cache misses)
    pub fetched: u64,
}

/// Run `plan` against `monitor`, blocking until every request is handled
pub fn run_workload(
    monitor: &PerformanceMonitor<Arc<String>>,
    plan: &WorkloadPlan,
) -> Result<WorkloadOutcome, WorkloadError> {
    let keys = plan.keys.max(1);
    let workers = plan.workers.max(1);
    let served = AtomicU64::new(0);
    let failed = AtomicU64::new(0);
    let fetched = AtomicU64::new(0);

    info!(
        iterations = plan.iterations,
        keys,
        workers,
        "starting synthetic workload"
    );
    let started = Instant::now();

    let (tx, rx) = channel::bounded::<u64>(workers * 4);

    crossbeam::scope(|s| {
        for worker in 0..workers {
            let rx = rx.clone();
            let (served, failed, fetched) = (&served, &failed, &fetched);
            s.spawn(move |_| {
                let _batch = monitor.profiler().time_block("worker_batch");
                for request in rx.iter() {
                    let key = format!("item-{}", request % keys);
                    let result = monitor.cached_profiled(&key, FETCH_OPERATION, || {
                        let n = fetched.fetch_add(1, Ordering::SeqCst) + 1;
                        simulated_fetch(&key, n, plan)
                    });
                    match result {
                        Ok(_) => served.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
                debug!(worker, "worker drained queue");
            });
        }
        drop(rx);

        for request in 0..plan.iterations {
            if tx.send(request).is_err() {
                break;
            }
        }
        drop(tx);
    })
    .map_err(|_| WorkloadError::WorkerPanicked)?;

    let elapsed = started.elapsed();
    monitor
        .profiler()
        .log_slow_query("workload", elapsed, monitor.recorder().slow_threshold());

    let outcome = WorkloadOutcome {
        served: served.into_inner(),
        failed: failed.into_inner(),
        fetched: fetched.into_inner(),
    };
    info!(
        served = outcome.served,
        failed = outcome.failed,
        fetched = outcome.fetched,
        elapsed_ms = elapsed.as_millis() as u64,
        "workload finished"
    );
    Ok(outcome)
}

fn simulated_fetch(key: &str, n: u64, plan: &WorkloadPlan) -> Result<Arc<String>, String> {
    if !plan.work.is_zero() {
        thread::sleep(plan.work);
    }
    if plan.fail_every > 0 && n % plan.fail_every == 0 {
        return Err(format!("fetch #{n} for {key} failed"));
    }
    Ok(Arc::new(format!("payload for {key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::PerfConfig;
    use crate::error::ProbeError;
    use crate::sampler::{ResourceProbe, ResourceReading};

    struct QuietProbe;

    impl ResourceProbe for QuietProbe {
        fn read(&mut self) -> Result<ResourceReading, ProbeError> {
            Ok(ResourceReading {
                cpu_percent: 1.0,
                memory_percent: 1.0,
                memory_used_mb: 1.0,
                disk_usage_percent: 1.0,
                active_threads: 1,
            })
        }

        fn process_memory_mb(&mut self) -> Option<f64> {
            None
        }
    }

    fn monitor(config: PerfConfig) -> PerformanceMonitor<Arc<String>> {
        PerformanceMonitor::with_parts(config, Arc::new(SystemClock), Box::new(QuietProbe)).unwrap()
    }

    fn plan(iterations: u64, keys: u64, fail_every: u64) -> WorkloadPlan {
        WorkloadPlan {
            iterations,
            keys,
            workers: 4,
            work: Duration::ZERO,
            fail_every,
        }
    }

    #[test]
    fn test_every_request_is_accounted_for() {
        let monitor = monitor(PerfConfig::default());
        let outcome = run_workload(&monitor, &plan(200, 10, 0)).unwrap();

        assert_eq!(outcome.served, 200);
        assert_eq!(outcome.failed, 0);
        // Concurrent misses may fetch a key more than once
        assert!(outcome.fetched >= 10);
        assert!(outcome.fetched <= 200);
    }

    #[test]
    fn test_fetch_stats_match_fetch_count() {
        let monitor = monitor(PerfConfig::default());
        let outcome = run_workload(&monitor, &plan(100, 5, 3)).unwrap();

        let stats = monitor.recorder().function_stats(FETCH_OPERATION).unwrap();
        assert_eq!(stats.call_count, outcome.fetched);
        assert_eq!(stats.error_count, outcome.fetched / 3);
        assert_eq!(outcome.served + outcome.failed, 100);
    }

    #[test]
    fn test_worker_blocks_are_timed() {
        let monitor = monitor(PerfConfig::default());
        run_workload(&monitor, &plan(20, 2, 0)).unwrap();

        let stats = monitor.recorder().function_stats("block_worker_batch").unwrap();
        assert_eq!(stats.call_count, 4);
    }

    #[test]
    fn test_disabled_profiling_records_nothing() {
        let config = PerfConfig {
            enable_profiling: false,
            ..PerfConfig::default()
        };
        let monitor = monitor(config);
        let outcome = run_workload(&monitor, &plan(50, 5, 0)).unwrap();

        assert_eq!(outcome.served, 50);
        assert_eq!(monitor.recorder().function_count(), 0);
    }
}
