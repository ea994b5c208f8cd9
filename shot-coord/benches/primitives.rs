use std::hint::black_box;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use futures::future::join_all;

use shot_coord::ClientIdentity;
use shot_coord::CompareAndSwap;
use shot_coord::CoordinationStore;
use shot_coord::FixedWindow;
use shot_coord::MemoryStore;
use shot_coord::MutualExclusionLock;
use shot_coord::PageCounter;
use shot_coord::SlidingWindow;

fn bench_primitives(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
    let limit = NonZeroU64::new(u64::MAX / 2).unwrap();
    let client = ClientIdentity::from_peer("10.0.0.1:4000");

    let fixed = FixedWindow::new(store.clone(), limit, Duration::from_secs(60));
    let sliding = SlidingWindow::new(store.clone(), limit, Duration::from_millis(10));
    let lock = MutualExclusionLock::new(store.clone(), "lock:bench", Duration::from_secs(60));
    let counter = PageCounter::new(store.clone(), "counter:bench", Duration::from_secs(60));
    let cas = CompareAndSwap::new(store.clone(), "state:bench", "old", "new");

    let mut group = c.benchmark_group("memory-store");
    group.bench_function("fixed_window", |b| {
        b.to_async(&rt).iter(|| async { black_box(fixed.decide(&client).await) })
    });
    group.bench_function("sliding_window", |b| {
        b.to_async(&rt).iter(|| async { black_box(sliding.decide(&client).await) })
    });
    group.bench_function("lock (held)", |b| {
        b.to_async(&rt).iter(|| async { black_box(lock.decide(&client).await) })
    });
    group.bench_function("page_counter", |b| {
        b.to_async(&rt).iter(|| async { black_box(counter.decide().await) })
    });
    group.bench_function("compare_and_swap (conflict)", |b| {
        b.to_async(&rt).iter(|| async { black_box(cas.decide().await) })
    });
    group.finish();

    let mut group = c.benchmark_group("memory-store-contended");
    group.bench_function("fixed_window x100", |b| {
        b.to_async(&rt).iter(|| async {
            let decisions = join_all((0..100).map(|_| fixed.decide(&client))).await;
            black_box(decisions)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_primitives);
criterion_main!(benches);
