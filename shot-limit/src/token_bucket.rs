use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use quanta::Clock;
use quanta::Instant;

use super::Reason;
use super::Strategy;

/// A classic token bucket.
///
/// The bucket starts full. Every `interval`, `increment` tokens are added back,
/// up to `capacity`. Refill is lazy: it happens inside `process`, so an idle
/// bucket costs nothing.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: usize,
    remaining: AtomicUsize,
    interval_ns: u64,
    /// Nanos (from anchor) of the last refill boundary we credited.
    last: AtomicU64,
    increment: usize,
    clock: Clock,
    anchor: Instant,
}

impl Strategy for TokenBucket {
    #[inline]
    fn process(&self) -> ControlFlow<Reason> {
        let now = self.now();
        self.refill(now);

        match self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |val| val.checked_sub(1))
        {
            Ok(prev) => {
                // A full bucket accrues nothing, so the refill clock restarts here.
                if prev == self.capacity {
                    self.last.fetch_max(now, Ordering::AcqRel);
                }
                ControlFlow::Continue(())
            }
            Err(_) => {
                let next = self.last.load(Ordering::Acquire).saturating_add(self.interval_ns);
                ControlFlow::Break(Reason::Overloaded {
                    retry_after: Duration::from_nanos(next.saturating_sub(now)),
                })
            }
        }
    }
}

impl TokenBucket {
    /// Creates a new `TokenBucket` using the default clock.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The maximum number of tokens held (the burst size).
    /// * `increment` - Tokens added back per elapsed `interval`.
    /// * `interval` - The refill period. A zero interval is treated as one nanosecond;
    ///   anything beyond `u64::MAX` nanoseconds saturates there.
    pub fn new(capacity: NonZeroUsize, increment: NonZeroUsize, interval: Duration) -> Self {
        Self::with_clock(capacity, increment, interval, Clock::new())
    }

    pub fn with_clock(
        capacity: NonZeroUsize,
        increment: NonZeroUsize,
        interval: Duration,
        clock: Clock,
    ) -> Self {
        let anchor = clock.now();
        Self {
            capacity: capacity.get(),
            remaining: AtomicUsize::new(capacity.get()),
            interval_ns: u64::try_from(interval.as_nanos())
                .unwrap_or(u64::MAX)
                .max(1),
            last: AtomicU64::new(0),
            increment: increment.get(),
            clock,
            anchor,
        }
    }

    /// Tokens currently available, without refilling.
    pub fn available(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    fn now(&self) -> u64 {
        let elapsed = self.clock.now().duration_since(self.anchor);
        u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
    }

    fn refill(&self, now: u64) {
        let last = self.last.load(Ordering::Acquire);
        let intervals_passed = now.saturating_sub(last) / self.interval_ns;
        if intervals_passed == 0 {
            return;
        }

        // Advance the clock by the exact intervals consumed so the remainder
        // carries over. Only the thread that moves the clock credits tokens.
        let next = last + intervals_passed * self.interval_ns;
        if self
            .last
            .compare_exchange(last, next, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            let added = (intervals_passed as usize).saturating_mul(self.increment);
            let _ = self
                .remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |val| {
                    Some(val.saturating_add(added).min(self.capacity))
                });
        }
    }
}
