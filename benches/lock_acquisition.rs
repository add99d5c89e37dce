//! Benchmarks for lock acquisition latency

use std::sync::Arc;
use std::time::Duration;

use advisory_lock_core::memory::InMemoryBackend;
use advisory_lock_core::DistributedLock;
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_memory_lock_acquisition(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = Arc::new(InMemoryBackend::new());
    let lock = DistributedLock::new("bench-lock", Arc::clone(&store)).unwrap();

    let mut group = c.benchmark_group("memory_lock");
    group.bench_function("try_acquire", |b| {
        b.to_async(&runtime).iter(|| async {
            if let Ok(Some(mut handle)) = lock.try_acquire(Duration::ZERO).await {
                let _ = handle.release().await;
            }
        });
    });

    group.bench_function("acquire_uncontended", |b| {
        b.to_async(&runtime).iter(|| async {
            if let Ok(mut handle) = lock.acquire(Some(Duration::from_millis(1))).await {
                let _ = handle.release().await;
            }
        });
    });

    group.bench_function("try_acquire_contended", |b| {
        let _held = runtime.block_on(lock.acquire(None)).unwrap();
        b.to_async(&runtime).iter(|| async {
            let refused = lock.try_acquire(Duration::ZERO).await;
            assert!(matches!(refused, Ok(None)));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_memory_lock_acquisition);
criterion_main!(benches);
