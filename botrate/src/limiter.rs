use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use tracing::debug;

use crate::Analyzer;
use crate::BotrateError;
use crate::Config;
use crate::WaitContext;
use crate::classifier::BotStatus;
use crate::classifier::Classifier;
use crate::classifier::KnownBots;
use crate::metrics::LimiterMetrics;
use crate::pool::LimiterPool;

/// Why a request was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// The client claims to be a crawler but failed verification.
    FakeBot,
    /// The client is blocked and its bucket is empty.
    RateLimited,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::FakeBot => "fake_bot",
            Reason::RateLimited => "rate_limited",
        }
    }
}

/// What classification means for the request.
enum Verdict {
    /// A verified crawler, or one we could not verify yet. Let it through untouched.
    TrustedBot,
    FakeBot,
    /// Not a crawler: subject to behavior analysis.
    Client,
}

/// Bot-aware rate limiter.
///
/// Every request is classified first. Verified crawlers pass without touching any
/// state and forged crawlers are rejected outright. Everyone else is allowed and
/// observed, until the behavior analyzer flags them; from then on they are held to
/// a strict per-client token bucket.
///
/// ```rust
/// use std::ops::ControlFlow;
/// use botrate::Config;
/// use botrate::Limiter;
///
/// let limiter = Limiter::new(Config::default()).unwrap();
/// match limiter.allow("Mozilla/5.0", "203.0.113.7") {
///     ControlFlow::Continue(()) => { /* serve */ }
///     ControlFlow::Break(reason) => println!("rejected: {}", reason.as_str()),
/// }
/// limiter.close();
/// ```
#[derive(Debug)]
pub struct Limiter {
    config: Config,
    classifier: Arc<dyn Classifier>,
    analyzer: Analyzer,
    limiters: LimiterPool,
    metrics: LimiterMetrics,
}

impl Limiter {
    /// Builds a limiter and starts its behavior analyzer.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the built-in classifier cannot be
    /// initialised, or the analyzer cannot start.
    pub fn new(config: Config) -> Result<Self, BotrateError> {
        config.validate()?;

        let classifier: Arc<dyn Classifier> = match &config.classifier {
            Some(classifier) => Arc::clone(classifier),
            None => Arc::new(KnownBots::new()?),
        };
        let analyzer = Analyzer::new(&config)?;
        let limiters = LimiterPool::new(config.refill_interval);

        debug!(?config, "bot-aware limiter created");

        Ok(Self {
            config,
            classifier,
            analyzer,
            limiters,
            metrics: LimiterMetrics::new(),
        })
    }

    /// Decides whether a request may proceed, without blocking.
    ///
    /// Only the user agent is known here, so it stands in for the page when the
    /// request is observed. Prefer [`Limiter::allow_request`] when the path is available.
    pub fn allow(&self, user_agent: &str, client_id: &str) -> ControlFlow<Reason> {
        self.allow_request(user_agent, client_id, user_agent)
    }

    /// Decides whether a request for `page` may proceed, without blocking.
    pub fn allow_request(
        &self,
        user_agent: &str,
        client_id: &str,
        page: &str,
    ) -> ControlFlow<Reason> {
        let outcome = match self.classify(user_agent, client_id) {
            Verdict::TrustedBot => ControlFlow::Continue(()),
            Verdict::FakeBot => ControlFlow::Break(Reason::FakeBot),
            Verdict::Client if self.analyzer.blocked(client_id) => {
                if self.limiters.get_or_create(client_id).allow() {
                    ControlFlow::Continue(())
                } else {
                    ControlFlow::Break(Reason::RateLimited)
                }
            }
            Verdict::Client => {
                self.analyzer.record(client_id, page);
                ControlFlow::Continue(())
            }
        };

        self.metrics.decision(match outcome {
            ControlFlow::Continue(()) => "allowed",
            ControlFlow::Break(reason) => reason.as_str(),
        });
        outcome
    }

    /// Waits until a request may proceed.
    ///
    /// Only blocked clients ever wait. As with [`Limiter::allow`], the user agent
    /// stands in for the page.
    ///
    /// # Errors
    ///
    /// - [`BotrateError::FakeBot`] for a crawler that failed verification.
    /// - [`BotrateError::Cancelled`] or [`BotrateError::DeadlineExceeded`] if `ctx`
    ///   ends before a blocked client's next token.
    /// - [`BotrateError::RateLimited`] if that token would arrive after `ctx`'s deadline.
    pub async fn wait(
        &self,
        ctx: &WaitContext,
        user_agent: &str,
        client_id: &str,
    ) -> Result<(), BotrateError> {
        self.wait_request(ctx, user_agent, client_id, user_agent)
            .await
    }

    /// Waits until a request for `page` may proceed. See [`Limiter::wait`].
    pub async fn wait_request(
        &self,
        ctx: &WaitContext,
        user_agent: &str,
        client_id: &str,
        page: &str,
    ) -> Result<(), BotrateError> {
        let outcome = match self.classify(user_agent, client_id) {
            Verdict::TrustedBot => Ok(()),
            Verdict::FakeBot => Err(BotrateError::FakeBot),
            Verdict::Client if self.analyzer.blocked(client_id) => {
                let limiter = self.limiters.get_or_create(client_id);
                limiter.wait(ctx).await
            }
            Verdict::Client => {
                self.analyzer.record(client_id, page);
                Ok(())
            }
        };

        self.metrics.decision(match &outcome {
            Ok(()) => "allowed",
            Err(BotrateError::FakeBot) => Reason::FakeBot.as_str(),
            Err(BotrateError::RateLimited) => Reason::RateLimited.as_str(),
            Err(_) => "abandoned",
        });
        outcome
    }

    /// Whether the analyzer has flagged `client_id`.
    pub fn is_blocked(&self, client_id: &str) -> bool {
        self.analyzer.blocked(client_id)
    }

    /// Every client flagged so far.
    pub fn blocked_clients(&self) -> Arc<HashSet<String>> {
        self.analyzer.blocked_clients()
    }

    /// Number of per-client token buckets created so far.
    pub fn throttled_clients(&self) -> usize {
        self.limiters.len()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stops the analyzer and releases per-client limiters.
    ///
    /// Idempotent. Calls racing with or following `close` still succeed; they just
    /// are no longer observed.
    pub fn close(&self) {
        self.analyzer.close();
        self.limiters.clear();
    }

    fn classify(&self, user_agent: &str, client_id: &str) -> Verdict {
        let result = self.classifier.validate(user_agent, client_id);
        if !result.is_bot {
            return Verdict::Client;
        }
        match result.status {
            BotStatus::Verified | BotStatus::Pending => Verdict::TrustedBot,
            BotStatus::Failed | BotStatus::Unknown => Verdict::FakeBot,
        }
    }

    #[cfg(test)]
    pub(crate) fn has_limiter(&self, client_id: &str) -> bool {
        self.limiters.contains(client_id)
    }
}
