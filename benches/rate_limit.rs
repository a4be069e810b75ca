use chatgate::admission::{AdmissionGate, PolicyTable, RequestContext, CHAT_COMPLETIONS};
use chatgate::rate_limit::{AdmissionLayer, InMemoryCounterStore, RateLimiter};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tower::{service_fn, Service, ServiceBuilder};

fn fixed_window_allow(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = RateLimiter::new(InMemoryCounterStore::new());
    let next = AtomicU64::new(0);

    c.bench_function("fixed_window_distinct_keys", |b| {
        b.to_async(&rt).iter(|| {
            // A fresh key per iteration keeps every call on the admit path.
            let key = format!("ip:{}", next.fetch_add(1, Ordering::Relaxed));
            let limiter = limiter.clone();
            async move {
                black_box(limiter.allow_fixed_window(&key, 10, Duration::from_secs(60)).await)
            }
        });
    });
}

fn token_bucket_hot_key(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = RateLimiter::new(InMemoryCounterStore::new());

    c.bench_function("token_bucket_hot_key", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(
                limiter.allow_token_bucket("hot", 1_000, 1_000, Duration::from_secs(1)).await,
            )
        });
    });
}

fn admission_layer_overhead(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let gate = Arc::new(AdmissionGate::new(
        RateLimiter::new(InMemoryCounterStore::new()),
        PolicyTable::with_defaults(),
    ));
    // Mostly rejections after the first five calls: measures the deny path.
    let svc = ServiceBuilder::new()
        .layer(AdmissionLayer::new(gate, CHAT_COMPLETIONS))
        .service(service_fn(|_ctx: RequestContext| async { Ok::<_, Infallible>(()) }));
    let ctx = RequestContext::new().with_principal("bench");

    c.bench_function("admission_layer_user_scope", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let _ = black_box(local_svc.call(black_box(ctx.clone()))).await;
        });
    });
}

criterion_group!(benches, fixed_window_allow, token_bucket_hot_key, admission_layer_overhead);
criterion_main!(benches);
