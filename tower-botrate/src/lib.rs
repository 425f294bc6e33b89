//! # Tower Botrate
//!
//! `tower-botrate` puts a [`botrate::Limiter`] in front of any
//! [Tower](https://github.com/tower-rs/tower) service that handles `http::Request`s.
//!
//! ## Per request
//! 1. **Identity**: the client is the first `X-Forwarded-For` hop, else `X-Real-IP`,
//!    else the peer `SocketAddr` recorded in the request extensions, else `"unknown"`.
//!    Header values that do not parse as an address, or that name loopback or the
//!    unspecified address, are skipped. [`BotRateLayer::with_trusted_proxies`] limits
//!    header use to requests arriving from known proxies.
//!    The user agent comes from the `User-Agent` header and the page is the URI path.
//! 2. **Decision**: by default throttled clients are rejected at once. With
//!    [`BotRateLayer::with_timeout`] they instead wait up to that long for a token.
//! 3. **Errors**: rejections surface as a boxed [`BotRateError`].
//!
//! ## Feature Flags
//!
//! - `axum`: Enables `IntoResponse` for [`BotRateError`] (403, 429, 408, 500) and reads
//!   the peer address from axum's `ConnectInfo`.

mod error;
mod layer;
mod service;


pub use error::BotRateError;
pub use ipnet::IpNet;
pub use layer::BotRateLayer;
pub use service::BotRateService;
pub use service::ResponseFuture;
