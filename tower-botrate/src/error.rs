use std::time::Duration;

use botrate::BotrateError;
use botrate::Reason;

/// Why the middleware turned a request away.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BotRateError {
    /// The client claims to be a known crawler but failed verification.
    ///
    /// When the `axum` feature is enabled, this converts to `403 Forbidden`.
    #[error("Bot identity could not be verified")]
    FakeBot,

    /// The client is throttled and no token arrived in time.
    ///
    /// When the `axum` feature is enabled, this converts to `429 Too Many Requests`
    /// with a `Retry-After` header.
    #[error("Rate limit exceeded; retry after {retry_after:?}")]
    RateLimited {
        /// Upper bound on the wait for the client's next token.
        retry_after: Duration,
    },

    /// The wait for a token was cut short by its deadline or cancelled.
    ///
    /// When the `axum` feature is enabled, this converts to `408 Request Timeout`.
    #[error("Request timed out waiting for rate limit capacity")]
    Timeout,

    /// The limiter failed for any other reason.
    ///
    /// When the `axum` feature is enabled, this converts to `500 Internal Server Error`.
    #[error("Internal limiter error: {0}")]
    Internal(String),
}

impl BotRateError {
    pub(crate) fn from_reason(reason: Reason, retry_after: Duration) -> Self {
        match reason {
            Reason::FakeBot => Self::FakeBot,
            Reason::RateLimited => Self::RateLimited { retry_after },
        }
    }

    pub(crate) fn from_wait(err: BotrateError, retry_after: Duration) -> Self {
        match err {
            BotrateError::FakeBot => Self::FakeBot,
            BotrateError::RateLimited => Self::RateLimited { retry_after },
            BotrateError::Cancelled | BotrateError::DeadlineExceeded => Self::Timeout,
            other => Self::Internal(other.to_string()),
        }
    }

    /// Label used for the rejection metric.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::FakeBot => "fake_bot",
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for BotRateError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let (status, msg, headers) = match self {
            Self::FakeBot => (StatusCode::FORBIDDEN, self.to_string(), None),
            Self::RateLimited { retry_after } => {
                let secs = retry_after.as_secs().max(1);
                let val = axum::http::HeaderValue::from(secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    self.to_string(),
                    Some((axum::http::header::RETRY_AFTER, val)),
                )
            }
            Self::Timeout => (StatusCode::REQUEST_TIMEOUT, self.to_string(), None),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string(), None),
        };

        let mut response = (status, msg).into_response();
        if let Some((name, value)) = headers {
            response.headers_mut().insert(name, value);
        }
        response
    }
}
