//! Benchmarks for the cache, metrics collector and coroutine task round-trip.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;

use dealerdesk_core::cache::TtlCache;
use dealerdesk_core::config::CoroutineManagerConfig;
use dealerdesk_core::core::{CoroutineTaskManager, TaskError};
use dealerdesk_core::runtime::EventLoop;
use dealerdesk_core::util::PerformanceMetrics;

use tokio::runtime::Runtime;

// ============================================================================
// Cache
// ============================================================================

fn bench_cache_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get_hit");
    for size in [100u64, 1_000, 10_000] {
        let cache = TtlCache::new(usize::try_from(size).unwrap(), Some(Duration::from_secs(300)));
        for key in 0..size {
            cache.set(key, key);
        }
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                for key in 0..size {
                    black_box(cache.get(&key));
                }
            });
        });
    }
    group.finish();
}

fn bench_cache_eviction_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_eviction_churn");
    for capacity in [64usize, 1_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                let cache = TtlCache::new(capacity, None);
                let mut next = 0u64;
                b.iter(|| {
                    cache.set(next, next);
                    next += 1;
                });
            },
        );
    }
    group.finish();
}

fn bench_cache_get_or_set(c: &mut Criterion) {
    c.bench_function("cache_get_or_set_mixed", |b| {
        let cache = TtlCache::new(512, Some(Duration::from_secs(60)));
        let mut i = 0u64;
        b.iter(|| {
            i = i.wrapping_add(7);
            black_box(cache.get_or_set(i % 1_024, || i * 2));
        });
    });
}

// ============================================================================
// Metrics
// ============================================================================

fn bench_metrics_record_request(c: &mut Criterion) {
    c.bench_function("metrics_record_request", |b| {
        let metrics = PerformanceMetrics::new();
        b.iter(|| {
            metrics.record_request(
                "GET",
                "https://dms.test/api/v2/inventory",
                Duration::from_millis(12),
                Some(200),
                true,
            );
        });
    });
}

// ============================================================================
// Coroutine tasks
// ============================================================================

fn bench_coroutine_run_and_wait(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let manager = CoroutineTaskManager::<u64>::new(
        EventLoop::from_handle(rt.handle().clone()),
        &CoroutineManagerConfig::new().with_executor_threads(2),
    )
    .unwrap();

    c.bench_function("coroutine_run_and_wait", |b| {
        b.to_async(&rt).iter(|| async {
            let id = manager
                .run(|_cancel| async { Ok::<_, TaskError>(black_box(42)) })
                .unwrap();
            black_box(manager.wait(&id, None).await);
            manager.take_result(&id);
        });
    });

    c.bench_function("coroutine_run_blocking_and_wait", |b| {
        b.to_async(&rt).iter(|| async {
            let id = manager
                .run_blocking(|_cancel| Ok::<_, TaskError>(black_box(7)))
                .unwrap();
            black_box(manager.wait(&id, None).await);
            manager.take_result(&id);
        });
    });
}

criterion_group!(
    benches,
    bench_cache_get_hit,
    bench_cache_eviction_churn,
    bench_cache_get_or_set,
    bench_metrics_record_request,
    bench_coroutine_run_and_wait,
);
criterion_main!(benches);
