//! # Rate Limiter Benchmarks
//!
//! End-to-end benchmarks for submitting, ticking and dual-read reporting.
//!
//! Run with: `cargo bench`

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use pacer::{
    ClockedExecutor, ClusterProperties, DualReadConfig, DualReadMonitor, ManualClock,
    OverflowPolicy, RateLimiter, RateLimiterBuilder, UriData, UriProperties, UNLIMITED_BURST,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn unlimited(executor: &ClockedExecutor) -> RateLimiter {
    RateLimiterBuilder::new()
        .clocked_executor(executor)
        .rate(i32::MAX as f64, 1000, UNLIMITED_BURST)
        .build()
        .unwrap()
}

/// Benchmark submits that find a permit on hand
fn bench_submit_fast_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_fast_path");
    group.throughput(Throughput::Elements(1));

    group.bench_function("granted_immediately", |b| {
        let executor = ClockedExecutor::new();
        let limiter = unlimited(&executor);
        b.iter(|| std::hint::black_box(limiter.submit(Box::new(|_| {}))));
    });

    group.finish();
}

/// Benchmark submits that have to wait in the buffer
fn bench_submit_buffered(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_buffered");

    for n in [16usize, 256, 4096] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let executor = ClockedExecutor::new();
                    let limiter = RateLimiterBuilder::new()
                        .clocked_executor(&executor)
                        .max_buffered(n)
                        .build()
                        .unwrap();
                    (executor, limiter)
                },
                |(_executor, limiter)| {
                    for _ in 0..n {
                        let _ = limiter.submit(Box::new(|_| {}));
                    }
                    limiter
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark draining a full buffer through ticks
fn bench_tick_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_drain");

    for n in [100usize, 1000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || {
                    let executor = ClockedExecutor::new();
                    let limiter = RateLimiterBuilder::new()
                        .clocked_executor(&executor)
                        .max_buffered(n)
                        .rate(n as f64, 1000, UNLIMITED_BURST)
                        .build()
                        .unwrap();
                    // The first period's permits are spent up front.
                    for _ in 0..2 * n {
                        let _ = limiter.submit(Box::new(|_| {}));
                    }
                    (executor, limiter)
                },
                |(executor, limiter)| {
                    executor.run_for(1000);
                    std::hint::black_box(limiter.pending())
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark concurrent submits
fn bench_concurrent_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_submit");

    for num_threads in [2, 4, 8, 16] {
        group.throughput(Throughput::Elements(num_threads as u64 * 1000));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_threads", num_threads)),
            &num_threads,
            |b, &num_threads| {
                let executor = ClockedExecutor::new();
                let limiter = Arc::new(unlimited(&executor));

                b.iter_custom(|iters| {
                    let mut total_duration = Duration::ZERO;

                    for _ in 0..iters {
                        let start = std::time::Instant::now();

                        let handles: Vec<_> = (0..num_threads)
                            .map(|_| {
                                let limiter = limiter.clone();
                                thread::spawn(move || {
                                    for _ in 0..1000 {
                                        let _ = limiter.submit(Box::new(|_| {}));
                                    }
                                })
                            })
                            .collect();

                        for handle in handles {
                            handle.join().unwrap();
                        }

                        total_duration += start.elapsed();
                    }

                    total_duration
                });
            },
        );
    }

    group.finish();
}

/// Benchmark overflow handling on a full buffer
fn bench_overflow_policies(c: &mut Criterion) {
    let mut group = c.benchmark_group("overflow_policies");

    let policies = [
        ("Reject", OverflowPolicy::Reject),
        ("DropOldest", OverflowPolicy::DropOldest),
    ];

    for (name, policy) in policies {
        group.bench_function(name, |b| {
            let executor = ClockedExecutor::new();
            let limiter = RateLimiterBuilder::new()
                .clocked_executor(&executor)
                .max_buffered(64)
                .overflow_policy(policy)
                .build()
                .unwrap();
            for _ in 0..64 {
                let _ = limiter.submit(Box::new(|_| {}));
            }

            b.iter(|| std::hint::black_box(limiter.submit(Box::new(|_| {}))));
        });
    }

    group.finish();
}

/// Benchmark rate changes
fn bench_set_rate(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_rate");

    group.bench_function("alternating", |b| {
        let executor = ClockedExecutor::new();
        let limiter = unlimited(&executor);
        let mut high = false;

        b.iter(|| {
            high = !high;
            let events = if high { 100.0 } else { 2.5 };
            std::hint::black_box(limiter.set_rate(events, 1000, UNLIMITED_BURST))
        });
    });

    group.finish();
}

/// Benchmark metrics collection
fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics");

    group.bench_function("get_metrics", |b| {
        let executor = ClockedExecutor::new();
        let limiter = RateLimiterBuilder::new()
            .clocked_executor(&executor)
            .rate(100.0, 1000, UNLIMITED_BURST)
            .build()
            .unwrap();
        for _ in 0..500 {
            let _ = limiter.submit(Box::new(|_| {}));
        }

        b.iter(|| std::hint::black_box(limiter.metrics()));
    });

    group.bench_function("summary", |b| {
        let executor = ClockedExecutor::new();
        let limiter = unlimited(&executor);
        let metrics = limiter.metrics();

        b.iter(|| std::hint::black_box(metrics.summary()));
    });

    group.finish();
}

/// Benchmark matched report pairs
fn bench_report_data(c: &mut Criterion) {
    let mut group = c.benchmark_group("report_data");
    group.throughput(Throughput::Elements(2));

    group.bench_function("cluster_match", |b| {
        let monitor = DualReadMonitor::<ClusterProperties>::new(
            DualReadConfig::default(),
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        let props = ClusterProperties {
            cluster_name: "bench".to_string(),
            ..Default::default()
        };
        let mut version = 0u64;

        b.iter(|| {
            version += 1;
            monitor.report_data("bench", props.clone(), version.to_string(), false);
            monitor.report_data("bench", props.clone(), version.to_string(), true);
        });
    });

    for hosts in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("uri_match", hosts), &hosts, |b, &hosts| {
            let monitor = DualReadMonitor::<UriProperties>::new(
                DualReadConfig::default(),
                Arc::new(ManualClock::default()),
            )
            .unwrap();
            let props = UriProperties::new(
                "bench",
                (0..hosts).map(|i| (format!("host-{}", i), UriData::with_weights([(0, 1.0)]))),
            );
            let mut version = 0u64;

            b.iter(|| {
                version += 1;
                monitor.report_data("bench", props.clone(), version.to_string(), false);
                monitor.report_data("bench", props.clone(), version.to_string(), true);
            });
        });
    }

    group.finish();
}

/// Benchmark sweeping a monitor full of unmatched reports
fn bench_evict_expired(c: &mut Criterion) {
    let mut group = c.benchmark_group("evict_expired");

    group.bench_function("evict_1000_keys", |b| {
        b.iter_batched(
            || {
                let clock = ManualClock::new(0);
                let monitor = DualReadMonitor::<ClusterProperties>::new(
                    DualReadConfig::default(),
                    Arc::new(clock.clone()),
                )
                .unwrap();
                for i in 0..1000 {
                    monitor.report_data(&format!("cluster-{}", i), Default::default(), "1", false);
                }
                clock.advance(monitor.config().entry_ttl_ms);
                monitor
            },
            |monitor| std::hint::black_box(monitor.evict_expired()),
            BatchSize::PerIteration,
        );
    });

    group.finish();
}

/// Benchmark URI similarity updates of growing clusters
fn bench_similarity_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity_update");

    for hosts in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(hosts as u64));
        group.bench_with_input(BenchmarkId::from_parameter(hosts), &hosts, |b, &hosts| {
            let monitor = DualReadMonitor::<UriProperties>::new(
                DualReadConfig::default(),
                Arc::new(ManualClock::default()),
            )
            .unwrap();
            let similarity = monitor.uri_similarity();
            let uris: BTreeMap<String, UriData> = (0..hosts)
                .map(|i| (format!("host-{}", i), UriData::default()))
                .collect();
            similarity.update("bench", uris.clone(), false);
            let mut from_new = false;

            b.iter(|| {
                from_new = !from_new;
                std::hint::black_box(similarity.update("bench", uris.clone(), from_new))
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_submit_fast_path,
    bench_submit_buffered,
    bench_tick_drain,
    bench_concurrent_submit,
    bench_overflow_policies,
    bench_set_rate,
    bench_metrics,
    bench_report_data,
    bench_evict_expired,
    bench_similarity_update,
);

criterion_main!(benches);
