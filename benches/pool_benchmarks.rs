use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use elastic_pool::{Config, Pool, SpinLock, Strategy, Task};
use std::hint::black_box;

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .unwrap()
}

fn trivial(i: u64) -> Task<u64> {
    Task::new(move || async move { Ok::<_, anyhow::Error>(black_box(i)) })
}

// Benchmark 1: Dispatch overhead по стратегиям
fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let rt = create_runtime();

    for size in [1_000u64, 10_000] {
        group.throughput(Throughput::Elements(size));

        for strategy in [Strategy::Lifo, Strategy::Fifo] {
            let pool = rt.block_on(async {
                Pool::<u64>::with_config(Config::new(num_cpus::get() * 2).with_strategy(strategy)).unwrap()
            });

            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", strategy), size),
                &size,
                |b, &size| {
                    let pool = &pool;
                    b.to_async(&rt).iter(|| async move {
                        for i in 0..size {
                            pool.add_task(trivial(i)).await.unwrap();
                        }
                        pool.wait().await;
                    });
                },
            );

            rt.block_on(pool.release());
        }
    }
    group.finish();
}

// Benchmark 2: мьютекс против спин-лока
fn bench_locks(c: &mut Criterion) {
    let mut group = c.benchmark_group("locks");
    let rt = create_runtime();
    let size = 10_000u64;
    group.throughput(Throughput::Elements(size));

    let mutex_pool = rt.block_on(async { Pool::<u64>::new(num_cpus::get() * 2).unwrap() });
    group.bench_function("parking_lot", |b| {
        let pool = &mutex_pool;
        b.to_async(&rt).iter(|| async move {
            for i in 0..size {
                pool.add_task(trivial(i)).await.unwrap();
            }
            pool.wait().await;
        });
    });
    rt.block_on(mutex_pool.release());

    let spin_pool = rt.block_on(async {
        Pool::<u64, SpinLock>::with_custom_lock(Config::new(num_cpus::get() * 2)).unwrap()
    });
    group.bench_function("spin", |b| {
        let pool = &spin_pool;
        b.to_async(&rt).iter(|| async move {
            for i in 0..size {
                pool.add_task(trivial(i)).await.unwrap();
            }
            pool.wait().await;
        });
    });
    rt.block_on(spin_pool.release());

    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_locks);
criterion_main!(benches);
