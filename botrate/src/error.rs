/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("refill interval must be greater than zero")]
    ZeroRefillInterval,

    #[error("refill rate must be a finite, positive number of events per second (got {0})")]
    InvalidRefillRate(f64),

    #[error("analysis window must be greater than zero")]
    ZeroWindow,

    #[error("page threshold must be at least 1")]
    ZeroPageThreshold,

    #[error("observation queue capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("visit counter capacity must be at least 1")]
    ZeroCounterCapacity,

    #[error("dedup filter capacity must be at least 1")]
    ZeroFilterCapacity,

    #[error("dedup filter false positive rate must lie strictly between 0 and 1 (got {0})")]
    InvalidFalsePositiveRate(f64),
}

/// Errors produced by the bot-aware limiter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BotrateError {
    /// The supplied configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The bot classifier could not be initialised.
    #[error("bot classifier failed to initialise: {0}")]
    Classifier(String),

    /// The behavior analyzer's worker thread could not be started.
    #[error("failed to start behavior analyzer: {0}")]
    Spawn(String),

    /// The caller cancelled the wait.
    #[error("wait cancelled")]
    Cancelled,

    /// The caller's deadline passed before a token became available.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The client is throttled and no token is available within the caller's deadline.
    #[error("rate limit exceeded")]
    RateLimited,

    /// The client claims to be a known crawler but failed verification.
    #[error("bot identity could not be verified")]
    FakeBot,
}

impl BotrateError {
    /// True for the two outcomes a caller's own context produces.
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}
