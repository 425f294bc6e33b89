use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use shot_limit::Strategy;
use shot_limit::TokenBucket;
use tracing::debug;

use crate::BotrateError;
use crate::WaitContext;

/// Token bucket for a single blocked client.
///
/// Burst is exactly one, so even an idle client gets a single immediate request
/// before being throttled to one per refill interval.
#[derive(Debug)]
pub struct ClientLimiter {
    bucket: TokenBucket,
}

impl ClientLimiter {
    pub fn new(refill_interval: Duration) -> Self {
        let one = NonZeroUsize::MIN;
        Self {
            bucket: TokenBucket::new(one, one, refill_interval),
        }
    }

    /// Consumes a token if one is available.
    pub fn allow(&self) -> bool {
        self.bucket.process().is_continue()
    }

    /// Waits until a token is available.
    ///
    /// # Errors
    ///
    /// - [`BotrateError::Cancelled`] / [`BotrateError::DeadlineExceeded`] if the
    ///   context ends first, including when it has already ended on entry.
    /// - [`BotrateError::RateLimited`] if the next token would only arrive after the
    ///   context's deadline, without waiting for it.
    pub async fn wait(&self, ctx: &WaitContext) -> Result<(), BotrateError> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }

        loop {
            let retry_after = match self.bucket.process() {
                ControlFlow::Continue(()) => return Ok(()),
                ControlFlow::Break(reason) => reason.retry_after(),
            };

            if ctx.would_exceed(retry_after) {
                return Err(BotrateError::RateLimited);
            }

            // Another waiter may take the token we slept for, so go round again.
            tokio::select! {
                _ = tokio::time::sleep(retry_after) => {}
                err = ctx.done() => return Err(err),
            }
        }
    }
}

/// Lazily populated map from blocked client to its [`ClientLimiter`].
///
/// Entries are never evicted; they only exist for clients already on the blocklist.
#[derive(Debug)]
pub(crate) struct LimiterPool {
    limiters: DashMap<String, Arc<ClientLimiter>>,
    refill_interval: Duration,
}

impl LimiterPool {
    pub(crate) fn new(refill_interval: Duration) -> Self {
        Self {
            limiters: DashMap::new(),
            refill_interval,
        }
    }

    /// Returns the client's limiter, creating it on first use.
    ///
    /// Racing creators for the same client all receive the single installed instance.
    pub(crate) fn get_or_create(&self, client_id: &str) -> Arc<ClientLimiter> {
        if let Some(limiter) = self.limiters.get(client_id) {
            return Arc::clone(limiter.value());
        }

        let entry = self
            .limiters
            .entry(client_id.to_owned())
            .or_insert_with(|| {
                debug!(client = client_id, "creating rate limiter for blocked client");
                Arc::new(ClientLimiter::new(self.refill_interval))
            });
        Arc::clone(entry.value())
    }

    pub(crate) fn len(&self) -> usize {
        self.limiters.len()
    }

    pub(crate) fn contains(&self, client_id: &str) -> bool {
        self.limiters.contains_key(client_id)
    }

    pub(crate) fn clear(&self) {
        self.limiters.clear();
    }
}
