//! Integration tests for the profiler and call recorder
//!
//! Covers stats aggregation, the bounded slow-call ring, reset, the
//! disabled pass-through mode and the scoped block timer.

use perfcache::clock::ManualClock;
use perfcache::profiler::{Profiler, BLOCK_PREFIX, SLOW_QUERY_PREFIX};
use perfcache::recorder::{CallRecorder, StatField, SLOW_CALL_CAPACITY};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn setup(enabled: bool, slow_ms: u64) -> (Profiler, Arc<CallRecorder>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let recorder = Arc::new(CallRecorder::with_clock(
        Duration::from_millis(slow_ms),
        clock.clone(),
    ));
    let profiler = Profiler::new(recorder.clone(), enabled).with_clock(clock.clone());
    (profiler, recorder, clock)
}

// ============================================================================
// Stats aggregation
// ============================================================================

#[test]
fn test_stats_accumulate_per_name() {
    let (profiler, recorder, clock) = setup(true, 1000);

    for ms in [100u64, 300, 200] {
        let _: Result<(), ()> = profiler.profile("load", || {
            clock.advance(Duration::from_millis(ms));
            Ok(())
        });
    }

    let stats = recorder.function_stats("load").unwrap();
    assert_eq!(stats.call_count, 3);
    assert_eq!(stats.success_count, 3);
    assert_eq!(stats.error_count, 0);
    assert!((stats.total_time - 0.6).abs() < 1e-9);
    assert!((stats.avg_time - 0.2).abs() < 1e-9);
    assert!((stats.min_time - 0.1).abs() < 1e-9);
    assert!((stats.max_time - 0.3).abs() < 1e-9);
}

#[test]
fn test_stats_are_monotonic() {
    let (profiler, recorder, clock) = setup(true, 1000);
    let mut previous = None;

    for i in 0..20u64 {
        let _: Result<(), ()> = profiler.profile("op", || {
            clock.advance(Duration::from_millis(i * 13 % 50));
            if i % 4 == 0 {
                Err(())
            } else {
                Ok(())
            }
        });

        let stats = recorder.function_stats("op").unwrap();
        assert_eq!(stats.call_count, stats.success_count + stats.error_count);
        assert!(stats.min_time <= stats.avg_time && stats.avg_time <= stats.max_time);
        if let Some((count, total)) = previous {
            assert!(stats.call_count > count);
            assert!(stats.total_time >= total);
        }
        previous = Some((stats.call_count, stats.total_time));
    }
}

#[test]
fn test_sorted_views_descend() {
    let recorder = CallRecorder::new(Duration::from_secs(10));
    recorder.record("few_slow", Duration::from_millis(900), true);
    recorder.record("many_fast", Duration::from_millis(10), true);
    recorder.record("many_fast", Duration::from_millis(10), true);
    recorder.record("many_fast", Duration::from_millis(10), false);

    let by_total = recorder.stats_sorted_by(StatField::TotalTime);
    assert_eq!(by_total[0].name, "few_slow");

    let by_count = recorder.stats_sorted_by(StatField::CallCount);
    assert_eq!(by_count[0].name, "many_fast");

    let by_errors = recorder.stats_sorted_by("error_count".parse().unwrap());
    assert_eq!(by_errors[0].name, "many_fast");
}

// ============================================================================
// Slow-call ring
// ============================================================================

#[test]
fn test_slow_ring_keeps_last_fifty() {
    let recorder = CallRecorder::new(Duration::from_millis(100));
    for i in 0..(SLOW_CALL_CAPACITY as u64 + 25) {
        recorder.record(&format!("call_{i}"), Duration::from_millis(200 + i), true);
    }

    let ring = recorder.slow_call_ring();
    assert_eq!(ring.len(), SLOW_CALL_CAPACITY);
    assert_eq!(ring.first().unwrap().name, "call_25");
    assert_eq!(ring.last().unwrap().name, "call_74");
}

#[test]
fn test_slow_calls_filtered_and_sorted() {
    let recorder = CallRecorder::new(Duration::from_millis(100));
    recorder.record("a", Duration::from_millis(150), true);
    recorder.record("b", Duration::from_millis(400), true);
    recorder.record("c", Duration::from_millis(250), true);
    recorder.record("fast", Duration::from_millis(50), true);

    let all: Vec<String> = recorder.slow_calls(None).into_iter().map(|e| e.name).collect();
    assert_eq!(all, vec!["b", "c", "a"]);

    let stricter = recorder.slow_calls(Some(Duration::from_millis(200)));
    assert_eq!(stricter.len(), 2);
}

#[test]
fn test_call_at_threshold_is_not_slow() {
    let recorder = CallRecorder::new(Duration::from_millis(100));
    recorder.record("edge", Duration::from_millis(100), true);
    assert_eq!(recorder.slow_call_count(), 0);
}

// ============================================================================
// Reset and disabled mode
// ============================================================================

#[test]
fn test_reset_is_idempotent() {
    let (profiler, recorder, _) = setup(true, 0);
    let _: Result<(), ()> = profiler.profile("op", || Ok(()));

    recorder.reset();
    recorder.reset();

    assert_eq!(recorder.function_count(), 0);
    assert!(recorder.slow_calls(None).is_empty());
    assert!(recorder.stats_sorted_by(StatField::TotalTime).is_empty());
}

#[test]
fn test_disabled_profiler_passes_through() {
    let (profiler, recorder, clock) = setup(false, 0);

    let ok: Result<u32, String> = profiler.profile("op", || {
        clock.advance(Duration::from_secs(5));
        Ok(1)
    });
    let err: Result<u32, String> = profiler.profile("op", || Err("boom".to_string()));
    let value = profiler.profile_infallible("pure", || 9);
    profiler.time_block("block").finish();
    profiler.log_slow_query("query", Duration::from_secs(9), Duration::from_secs(1));

    assert_eq!(ok, Ok(1));
    assert_eq!(err, Err("boom".to_string()));
    assert_eq!(value, 9);
    assert_eq!(recorder.function_count(), 0);
    assert_eq!(recorder.slow_call_count(), 0);
}

// ============================================================================
// Panics and block timers
// ============================================================================

#[test]
fn test_panicking_operation_recorded_once_as_error() {
    let (profiler, recorder, _) = setup(true, 1000);

    let result = catch_unwind(AssertUnwindSafe(|| {
        profiler.profile_infallible("explodes", || -> u32 { panic!("kaboom") })
    }));

    assert!(result.is_err(), "panic must propagate");
    let stats = recorder.function_stats("explodes").unwrap();
    assert_eq!(stats.call_count, 1);
    assert_eq!(stats.error_count, 1);
}

#[test]
fn test_block_timer_records_exactly_once() {
    let (profiler, recorder, clock) = setup(true, 1000);

    let timer = profiler.time_block("finished");
    clock.advance(Duration::from_millis(20));
    timer.finish();

    let timer = profiler.time_block("failed");
    timer.fail();

    {
        let _timer = profiler.time_block("dropped");
    }

    let finished = recorder
        .function_stats(&format!("{BLOCK_PREFIX}finished"))
        .unwrap();
    assert_eq!(finished.call_count, 1);
    assert!((finished.total_time - 0.02).abs() < 1e-9);

    let failed = recorder.function_stats("block_failed").unwrap();
    assert_eq!((failed.call_count, failed.error_count), (1, 1));

    let dropped = recorder.function_stats("block_dropped").unwrap();
    assert_eq!((dropped.call_count, dropped.success_count), (1, 1));
}

#[test]
fn test_block_timer_elapsed_tracks_clock() {
    let (profiler, _, clock) = setup(true, 1000);
    let timer = profiler.time_block("t");
    clock.advance(Duration::from_millis(250));
    assert!(timer.is_active());
    assert_eq!(timer.elapsed(), Duration::from_millis(250));
}

#[test]
fn test_slow_query_only_above_threshold() {
    let (profiler, recorder, _) = setup(true, 1000);
    profiler.log_slow_query("orders", Duration::from_millis(500), Duration::from_secs(1));
    profiler.log_slow_query("orders", Duration::from_millis(1500), Duration::from_secs(1));

    let stats = recorder
        .function_stats(&format!("{SLOW_QUERY_PREFIX}orders"))
        .unwrap();
    assert_eq!(stats.call_count, 1);
}

#[test]
fn test_wrapped_function_profiles_each_call() {
    let (profiler, recorder, _) = setup(true, 1000);
    let parse = profiler.wrap("parse", |s: String| s.parse::<i32>());

    assert_eq!(parse("12".to_string()), Ok(12));
    assert!(parse("x".to_string()).is_err());

    let stats = recorder.function_stats("parse").unwrap();
    assert_eq!((stats.success_count, stats.error_count), (1, 1));
}

#[test]
fn test_concurrent_recording_counts_every_call() {
    let recorder = Arc::new(CallRecorder::new(Duration::from_secs(1)));
    let profiler = Arc::new(Profiler::new(recorder.clone(), true));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let profiler = profiler.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    let _: Result<(), ()> = profiler.profile("shared", || Ok(()));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(recorder.function_stats("shared").unwrap().call_count, 2000);
}
