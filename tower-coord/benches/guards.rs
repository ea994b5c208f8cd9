use std::convert::Infallible;
use std::hint::black_box;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::response::IntoResponse;
use criterion::BenchmarkGroup;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::measurement::WallTime;
use futures::stream::FuturesUnordered;
use futures::stream::StreamExt;
use shot_coord::CoordinationStore;
use shot_coord::MemoryStore;
use tower::ServiceExt;
use tower::service_fn;
use tower_coord::AccessLogLayer;
use tower_coord::GuardLayer;
use tower_coord::Handler;
use tower_coord::Interceptor;
use tower_coord::PeerAddr;
use tower_coord::RecoveryLayer;
use tower_coord::chain;
use tower_coord::handler;

// --- HELPERS ---

fn noop_handler() -> Handler {
    handler(service_fn(|_req: Request| async {
        Ok::<_, Infallible>("ok".into_response())
    }))
}

fn request() -> Request {
    http::Request::builder()
        .uri("/")
        .extension(PeerAddr("10.0.0.1:4000".to_string()))
        .body(Body::empty())
        .unwrap()
}

/// Single-call overhead of a chain
fn bench_overhead(
    group: &mut BenchmarkGroup<WallTime>,
    rt: &tokio::runtime::Runtime,
    id: &str,
    svc: Handler,
) {
    group.bench_function(id, |b| {
        b.to_async(rt).iter(|| {
            let s = svc.clone();
            async move { black_box(s.oneshot(request()).await) }
        });
    });
}

/// Concurrent calls through one chain, all hitting the same keys
fn bench_burst(
    group: &mut BenchmarkGroup<WallTime>,
    rt: &tokio::runtime::Runtime,
    id: &str,
    svc: Handler,
    burst_size: usize,
) {
    group.bench_function(id, |b| {
        b.to_async(rt).iter(|| {
            let s = svc.clone();
            async move {
                let mut futures = FuturesUnordered::new();
                for _ in 0..burst_size {
                    futures.push(s.clone().oneshot(request()));
                }
                while let Some(res) = futures.next().await {
                    let _ = black_box(res);
                }
            }
        });
    });
}

fn bench_all_scenarios(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    // Large enough that the limiters keep admitting
    let limit = NonZeroU64::new(u64::MAX / 2).unwrap();
    let window = Duration::from_secs(60);

    let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
    let scenarios: Vec<(&str, Vec<Interceptor>)> = vec![
        ("bare", vec![]),
        ("recovery", vec![Interceptor::layer(RecoveryLayer::new())]),
        (
            "recovery+access_log",
            vec![
                Interceptor::layer(RecoveryLayer::new()),
                Interceptor::layer(AccessLogLayer::new()),
            ],
        ),
        (
            "fixed_window",
            vec![GuardLayer::fixed_window(store.clone(), limit, window).into()],
        ),
        (
            "sliding_window",
            // Short window keeps the per-client log small
            vec![GuardLayer::sliding_window(store.clone(), limit, Duration::from_millis(10)).into()],
        ),
        (
            "page_counter",
            vec![GuardLayer::page_counter(store.clone(), "counter:bench", window).into()],
        ),
    ];

    let mut group = c.benchmark_group("overhead");
    for (id, interceptors) in &scenarios {
        bench_overhead(&mut group, &rt, id, chain(noop_handler(), interceptors));
    }
    group.finish();

    let mut group = c.benchmark_group("burst-100");
    for (id, interceptors) in &scenarios {
        bench_burst(&mut group, &rt, id, chain(noop_handler(), interceptors), 100);
    }
    group.finish();
}

criterion_group!(benches, bench_all_scenarios);
criterion_main!(benches);
