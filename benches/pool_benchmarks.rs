use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use surgepool::pool::{Config, OverflowPolicy, WorkerPoolInner};

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .unwrap()
}

// Benchmark 1: submit-and-await round trip
fn bench_submit_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_roundtrip");

    for size in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("default", size), &size, |b, &size| {
            let rt = create_runtime();
            let pool = rt.block_on(async { WorkerPoolInner::with_config(Config::default()) });

            b.to_async(&rt).iter(|| {
                let pool = &pool;
                async move {
                    let mut handles = Vec::with_capacity(size);
                    for i in 0..size {
                        handles.push(pool.submit(async move { black_box(i) }).await.unwrap());
                    }
                    for handle in handles {
                        black_box(handle.await.unwrap());
                    }
                }
            });
        });
    }

    group.finish();
}

// Benchmark 2: hand-off through a saturated queue with backpressure
fn bench_caller_runs_backpressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("caller_runs_backpressure");

    for size in [1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("tiny_queue", size), &size, |b, &size| {
            let rt = create_runtime();
            let pool = rt.block_on(async {
                WorkerPoolInner::with_config(Config {
                    core_size: 2,
                    max_size: 4,
                    queue_capacity: 8,
                    overflow_policy: OverflowPolicy::CallerRuns,
                    ..Default::default()
                })
            });

            b.to_async(&rt).iter(|| {
                let pool = &pool;
                async move {
                    let mut handles = Vec::with_capacity(size);
                    for i in 0..size {
                        handles.push(pool.submit(async move { black_box(i) }).await.unwrap());
                    }
                    for handle in handles {
                        black_box(handle.await.unwrap());
                    }
                }
            });
        });
    }

    group.finish();
}

// Benchmark 3: blocking closure offload
fn bench_submit_blocking(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_blocking");
    group.throughput(Throughput::Elements(256));

    group.bench_function("closures_256", |b| {
        let rt = create_runtime();
        let pool = rt.block_on(async { WorkerPoolInner::with_config(Config::cpu_bound()) });

        b.to_async(&rt).iter(|| {
            let pool = &pool;
            async move {
                let mut handles = Vec::with_capacity(256);
                for i in 0..256u64 {
                    handles.push(
                        pool.submit_blocking(move || black_box(i).wrapping_mul(31))
                            .await
                            .unwrap(),
                    );
                }
                for handle in handles {
                    black_box(handle.await.unwrap());
                }
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_submit_roundtrip,
    bench_caller_runs_backpressure,
    bench_submit_blocking
);
criterion_main!(benches);
