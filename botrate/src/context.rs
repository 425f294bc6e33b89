use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::BotrateError;

/// Cancellation and deadline for a blocking [`crate::Limiter::wait`].
///
/// ```rust
/// use std::time::Duration;
/// use botrate::WaitContext;
///
/// let ctx = WaitContext::new().with_timeout(Duration::from_millis(250));
/// let token = ctx.token().clone();
/// // Anyone holding `token` can abandon the wait early.
/// token.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct WaitContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl WaitContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ties the context to an existing token, e.g. a request's or a server's shutdown token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Gives up `timeout` from now. Keeps an earlier deadline if one is already set.
    ///
    /// A timeout too large to represent as an instant sets no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Gives up at `deadline`. Keeps an earlier deadline if one is already set.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The error this context has already produced, if any.
    pub(crate) fn err(&self) -> Option<BotrateError> {
        if self.token.is_cancelled() {
            Some(BotrateError::Cancelled)
        } else if self.deadline.is_some_and(|d| d <= Instant::now()) {
            Some(BotrateError::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Whether waiting `wait` from now would run past the deadline.
    pub(crate) fn would_exceed(&self, wait: Duration) -> bool {
        self.deadline
            .is_some_and(|d| Instant::now().checked_add(wait).is_none_or(|at| at > d))
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub(crate) async fn done(&self) -> BotrateError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => BotrateError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => BotrateError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                BotrateError::Cancelled
            }
        }
    }
}
