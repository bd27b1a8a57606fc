//! Benchmarks for the priority worker pool: submission throughput under
//! mixed priorities, with and without label rate limiting.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use tokio::runtime::Runtime;

use task_cortex::core::resource_probe::MockProbe;
use task_cortex::core::task::{BoxFuture, RetryPolicy, TaskOutcome, TaskResult};
use task_cortex::core::worker_pool::{PriorityWorkerPool, WorkerPoolConfig};
use task_cortex::util::ids::Priority;

fn noop_func() -> task_cortex::core::task::TaskFn {
    Arc::new(|| -> BoxFuture<'static, TaskOutcome> { Box::pin(async move { Ok(TaskResult::Empty) }) })
}

fn build_pool(worker_count: usize) -> Arc<PriorityWorkerPool> {
    let config = WorkerPoolConfig {
        worker_count,
        ..WorkerPoolConfig::default()
    };
    let pool = PriorityWorkerPool::new(config, Arc::new(MockProbe::new(0.0, 0)));
    let pool = Arc::new(pool);
    pool.start();
    pool
}

fn bench_submit_mixed_priorities(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_submit_mixed_priorities");
    for count in [100, 1_000, 5_000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let pool = build_pool(4);
                for i in 0..count {
                    let priority = match i % 4 {
                        0 => Priority::Critical,
                        1 => Priority::High,
                        2 => Priority::Normal,
                        _ => Priority::Low,
                    };
                    let id = pool
                        .submit(
                            noop_func(),
                            priority,
                            Duration::ZERO,
                            Default::default(),
                            None,
                            RetryPolicy::default(),
                            "bench_task",
                            HashMap::new(),
                        )
                        .unwrap();
                    black_box(id);
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                pool.stop(false, false);
            });
        });
    }
    group.finish();
}

fn bench_submit_with_rate_limit(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_submit_with_rate_limit");
    group.bench_function("throttled_label", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let pool = build_pool(2);
            pool.set_rate_limit("throttled", 1000.0, 1000.0);
            for _ in 0..200 {
                let id = pool
                    .submit(
                        noop_func(),
                        Priority::Normal,
                        Duration::ZERO,
                        ["throttled".to_string()].into_iter().collect(),
                        None,
                        RetryPolicy::default(),
                        "bench_task",
                        HashMap::new(),
                    )
                    .unwrap();
                black_box(id);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            pool.stop(false, false);
        });
    });
    group.finish();
}

criterion_group!(pool_benches, bench_submit_mixed_priorities, bench_submit_with_rate_limit);
criterion_main!(pool_benches);
