use std::num::NonZeroUsize;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use quanta::Clock;

use shot_limit::Strategy;
use shot_limit::TokenBucket;

const BLOCKED_INTERVAL: Duration = Duration::from_secs(600);

fn one() -> NonZeroUsize {
    NonZeroUsize::new(1).unwrap()
}

/// Bucket handed to a client the first time it is seen on the blocklist.
fn blocked_client_bucket() -> TokenBucket {
    TokenBucket::new(one(), one(), BLOCKED_INTERVAL)
}

fn bench_blocked_client(c: &mut Criterion) {
    let mut group = c.benchmark_group("BlockedClient");

    // Creation plus the single burst token.
    group.bench_function("first-request", |b| {
        b.iter(|| {
            let bucket = blocked_client_bucket();
            black_box(bucket.process())
        })
    });

    let drained = blocked_client_bucket();
    let _ = drained.process();
    group.bench_function("rejected", |b| b.iter(|| black_box(drained.process())));

    // A mock clock stepped one interval per call keeps the bucket on its refill path.
    let (clock, mock) = Clock::mock();
    let refilling = TokenBucket::with_clock(one(), one(), BLOCKED_INTERVAL, clock);
    let _ = refilling.process();
    group.bench_function("refilled", |b| {
        b.iter(|| {
            mock.increment(BLOCKED_INTERVAL);
            black_box(refilling.process())
        })
    });

    group.finish();
}

/// Many handlers racing on one blocked client's bucket.
fn bench_contended_rejection(c: &mut Criterion) {
    let mut group = c.benchmark_group("BlockedClient-Contended");
    let bucket = blocked_client_bucket();
    let _ = bucket.process();

    for threads in [2usize, 4, 8] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{threads}-threads")),
            &threads,
            |b, &n| {
                b.iter_custom(|iters| {
                    let per_thread = iters / n as u64;
                    let barrier = Barrier::new(n + 1);
                    thread::scope(|s| {
                        for _ in 0..n {
                            s.spawn(|| {
                                barrier.wait();
                                for _ in 0..per_thread {
                                    let _ = black_box(bucket.process());
                                }
                            });
                        }
                        barrier.wait();
                        let start = Instant::now();
                        // Leaving the scope joins every worker.
                        start
                    })
                    .elapsed()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_blocked_client, bench_contended_rejection);
criterion_main!(benches);
