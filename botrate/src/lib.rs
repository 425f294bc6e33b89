//! # botrate
//!
//! `botrate` is a bot-aware admission controller. It leaves humans and genuine crawlers
//! alone, rejects clients that forge a crawler's identity, and throttles clients whose
//! browsing looks like scraping.
//!
//! ## How a request is decided
//!
//! 1. **Classification**: a [`Classifier`] inspects the user agent and client address.
//!    Verified crawlers (and those whose verification is still pending) pass untouched.
//!    Crawlers that fail verification are rejected with [`Reason::FakeBot`].
//! 2. **Blocklist**: anyone else already flagged by the [`Analyzer`] is held to a per-client
//!    token bucket with a burst of one, rejected with [`Reason::RateLimited`] when it is empty.
//! 3. **Observation**: everyone else is allowed, and the visit is queued for the analyzer.
//!
//! ## Behavior analysis
//!
//! The analyzer runs on its own thread. It deduplicates `(client, page)` pairs through a
//! double-buffered Bloom filter that rotates every window, counts distinct pages per
//! client in an LRU, and blocks a client once it reaches the page threshold. Blocks are
//! permanent for the life of the [`Limiter`].
//!
//! The hot path never waits on the analyzer: when its queue is full, observations are
//! dropped.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//! use botrate::Config;
//! use botrate::Limiter;
//!
//! let limiter = Limiter::new(
//!     Config::default()
//!         .with_window(Duration::from_secs(60))
//!         .with_page_threshold(100),
//! )
//! .unwrap();
//!
//! assert!(limiter.allow_request("Mozilla/5.0", "203.0.113.7", "/index.html").is_continue());
//! limiter.close();
//! ```

mod analyzer;
mod classifier;
mod config;
mod context;
mod error;
mod limiter;
mod metrics;
mod pool;


pub use analyzer::Analyzer;
pub use classifier::BotRule;
pub use classifier::BotStatus;
pub use classifier::Classification;
pub use classifier::Classifier;
pub use classifier::KnownBots;
pub use config::Config;
pub use config::DEFAULT_COUNTER_CAPACITY;
pub use config::DEFAULT_FALSE_POSITIVE_RATE;
pub use config::DEFAULT_FILTER_CAPACITY;
pub use config::DEFAULT_PAGE_THRESHOLD;
pub use config::DEFAULT_QUEUE_CAPACITY;
pub use config::DEFAULT_REFILL_INTERVAL;
pub use config::DEFAULT_WINDOW;
pub use context::WaitContext;
pub use error::BotrateError;
pub use error::ConfigError;
pub use limiter::Limiter;
pub use limiter::Reason;
pub use pool::ClientLimiter;

// Re-exported so callers can build a `WaitContext` without depending on tokio-util.
pub use tokio_util::sync::CancellationToken;
