//! # shot-limit
//!
//! `shot-limit` provides the lock-free token bucket used to throttle individual clients.
//!
//! ## Core Philosophy
//!
//! Most rate limiters rely on a `Mutex` to protect internal state, which creates a bottleneck
//! under high thread contention. `shot-limit` uses atomic primitives and Compare-And-Swap (CAS)
//! loops to ensure that state transitions are non-blocking and scale linearly with CPU cores.
//!
//! ## Key Concepts
//!
//! * **Lock-Free**: No `Mutex` or `RwLock` in the hot path.
//! * **Lazy Evaluation**: Tokens are recalculated at the moment of the request,
//!   eliminating the need for background worker threads or timers.
//! * **Retry Hints**: A rejected request learns how long to wait before a token
//!   will be available, which is what blocking callers sleep on.
//!
//! ## Example
//!
//! ```rust
//! use shot_limit::TokenBucket;
//! use shot_limit::Strategy;
//! use std::time::Duration;
//! use std::num::NonZeroUsize;
//!
//! // One token every 100ms, no burst beyond a single request.
//! let one = NonZeroUsize::new(1).unwrap();
//! let bucket = TokenBucket::new(one, one, Duration::from_millis(100));
//!
//! assert!(bucket.process().is_continue());
//! assert!(bucket.process().is_break());
//! ```

use std::fmt::Debug;
use std::ops::ControlFlow;
use std::time::Duration;

mod token_bucket;

pub use token_bucket::TokenBucket;

/// Reasons why a request might be rejected by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Overloaded { retry_after: Duration },
}

impl Reason {
    /// How long the caller should wait before trying again.
    pub fn retry_after(&self) -> Duration {
        let Reason::Overloaded { retry_after } = self;
        *retry_after
    }
}

/// The core trait for all rate-limiting algorithms.
///
/// Strategies must be `Send` and `Sync` to allow sharing across thread boundaries
/// via `Arc`.
pub trait Strategy: Debug {
    /// Attempts to process a single request.
    ///
    /// This method is non-blocking and uses atomic operations to update
    /// internal state.
    ///
    /// # Errors
    ///
    /// Returns `Reason` if the rate limit has been reached.
    fn process(&self) -> ControlFlow<Reason>;
}
