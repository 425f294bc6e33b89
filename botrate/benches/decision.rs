use std::ops::ControlFlow;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use botrate::BotStatus;
use botrate::Classification;
use botrate::Classifier;
use botrate::Config;
use botrate::Limiter;
use botrate::WaitContext;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

// Bots are recognised by a prefix; no address verification in the hot loop.
#[derive(Debug)]
struct PrefixClassifier;

impl Classifier for PrefixClassifier {
    fn validate(&self, user_agent: &str, _client_id: &str) -> Classification {
        if user_agent.starts_with("Googlebot") {
            Classification::bot(BotStatus::Verified)
        } else if user_agent.starts_with("Fakebot") {
            Classification::bot(BotStatus::Failed)
        } else {
            Classification::human()
        }
    }
}

fn limiter() -> Arc<Limiter> {
    Arc::new(
        Limiter::new(
            Config::default()
                .with_window(Duration::from_secs(3600))
                .with_page_threshold(2)
                .with_classifier(Arc::new(PrefixClassifier)),
        )
        .unwrap(),
    )
}

fn block(limiter: &Limiter, client: &str) {
    let _ = limiter.allow_request("Mozilla/5.0", client, "/a");
    let _ = limiter.allow_request("Mozilla/5.0", client, "/b");
    while !limiter.is_blocked(client) {
        thread::sleep(Duration::from_millis(1));
    }
}

fn bench_allow(c: &mut Criterion) {
    let limiter = limiter();
    block(&limiter, "10.0.0.99");

    let mut group = c.benchmark_group("Allow");

    group.bench_function("human-observed", |b| {
        let mut page = 0u64;
        b.iter(|| {
            page += 1;
            let path = format!("/{}", page % 1_000);
            black_box(limiter.allow_request("Mozilla/5.0", "10.0.0.1", &path))
        })
    });

    group.bench_function("verified-bot", |b| {
        b.iter(|| black_box(limiter.allow(black_box("Googlebot/2.1"), "66.249.66.1")))
    });

    group.bench_function("fake-bot", |b| {
        b.iter(|| {
            let outcome = limiter.allow(black_box("Fakebot/1.0"), "192.168.1.1");
            debug_assert!(matches!(outcome, ControlFlow::Break(_)));
            black_box(outcome)
        })
    });

    group.bench_function("blocked-rejected", |b| {
        b.iter(|| black_box(limiter.allow("Mozilla/5.0", black_box("10.0.0.99"))))
    });

    group.finish();
    limiter.close();
}

fn bench_wait(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = limiter();

    c.bench_function("Wait/verified-bot", |b| {
        let ctx = WaitContext::new();
        b.to_async(&rt).iter(|| {
            let limiter = Arc::clone(&limiter);
            let ctx = ctx.clone();
            async move {
                let res = limiter.wait(&ctx, "Googlebot/2.1", "66.249.66.1").await;
                black_box(res)
            }
        })
    });

    limiter.close();
}

criterion_group!(benches, bench_allow, bench_wait);
criterion_main!(benches);
