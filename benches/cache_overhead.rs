//! TTL cache hot path benchmark
//!
//! Every `get` and `set` sweeps expired entries, so lookup cost grows with
//! the number of stored entries. These benchmarks show how far that scales
//! for realistic cache sizes.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench cache_overhead
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use perfcache::memoize::cached_call_infallible;
use perfcache::ttl_cache::TtlCache;
use std::time::Duration;

fn filled_cache(size: usize) -> TtlCache<String, u64> {
    let cache = TtlCache::new(size, Duration::from_secs(600)).unwrap();
    for i in 0..size {
        cache.set(format!("key-{i}"), i as u64);
    }
    cache
}

/// Benchmark: cache hit on a full cache of varying size
fn bench_cache_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get_hit");

    for size in [16, 256, 1024, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let cache = filled_cache(size);
            let mut i = 0usize;
            b.iter(|| {
                let key = format!("key-{}", i % size);
                black_box(cache.get(black_box(key.as_str())));
                i += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark: insert into a full cache, evicting the LRU entry each time
fn bench_cache_set_evicting(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_set_evicting");

    for size in [16, 256, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let cache = filled_cache(size);
            let mut i = size;
            b.iter(|| {
                cache.set(format!("key-{i}"), black_box(i as u64));
                i += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark: memoized call served from the cache
fn bench_memoized_hit(c: &mut Criterion) {
    let cache = filled_cache(256);

    c.bench_function("memoized_hit", |b| {
        b.iter(|| {
            black_box(cached_call_infallible(&cache, "key-7".to_string(), || 0));
        });
    });
}

criterion_group!(
    benches,
    bench_cache_get_hit,
    bench_cache_set_evicting,
    bench_memoized_hit
);
criterion_main!(benches);
