use std::future::Future;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use botrate::Limiter;
use botrate::WaitContext;
use http::Request;
use http::header::USER_AGENT;
use ipnet::IpNet;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use tower::BoxError;
use tower::Service;
use tracing::debug;

use crate::error::BotRateError;

const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Clone, Debug)]
struct BotRateServiceMetrics {
    rejections: Counter<u64>,
}

pub type ResponseFuture<T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send>>;

/// Consults a [`Limiter`] before handing each request to the inner service.
#[derive(Debug)]
pub struct BotRateService<S> {
    inner: S,
    limiter: Arc<Limiter>,
    timeout: Option<Duration>,
    trusted_proxies: Option<Arc<[IpNet]>>,
    instruments: BotRateServiceMetrics,
}

impl<S> Clone for BotRateService<S>
where
    S: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            timeout: self.timeout,
            trusted_proxies: self.trusted_proxies.clone(),
            instruments: self.instruments.clone(),
        }
    }
}

impl<S, B> Service<Request<B>> for BotRateService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = ResponseFuture<S::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // Take the instance that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let limiter = Arc::clone(&self.limiter);
        let timeout = self.timeout;
        let trusted_proxies = self.trusted_proxies.clone();
        let instruments = self.instruments.clone();

        Box::pin(async move {
            let client_id = client_id(&req, trusted_proxies.as_deref());
            let user_agent = req
                .headers()
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_owned();
            let page = req.uri().path().to_owned();
            let retry_after = limiter.config().refill_interval;

            let verdict = match timeout {
                None => match limiter.allow_request(&user_agent, &client_id, &page) {
                    ControlFlow::Continue(()) => Ok(()),
                    ControlFlow::Break(reason) => {
                        Err(BotRateError::from_reason(reason, retry_after))
                    }
                },
                Some(timeout) => {
                    let ctx = WaitContext::new().with_timeout(timeout);
                    limiter
                        .wait_request(&ctx, &user_agent, &client_id, &page)
                        .await
                        .map_err(|err| BotRateError::from_wait(err, retry_after))
                }
            };

            if let Err(err) = verdict {
                debug!(client = %client_id, error = %err, "request rejected");
                instruments
                    .rejections
                    .add(1, &[KeyValue::new("reason", err.kind())]);
                return Err(Box::new(err) as BoxError);
            }

            inner.call(req).await.map_err(Into::into)
        })
    }
}

impl<S> BotRateService<S> {
    pub fn new(inner: S, limiter: Arc<Limiter>) -> Self {
        let meter = global::meter("bot_rate_service");
        let instruments = BotRateServiceMetrics {
            rejections: meter
                .u64_counter("bot_rate_service.rejections")
                .with_description("Requests rejected by reason")
                .build(),
        };

        Self {
            inner,
            limiter,
            timeout: None,
            trusted_proxies: None,
            instruments,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Only honour proxy headers on requests whose peer is inside one of `proxies`.
    pub fn with_trusted_proxies(mut self, proxies: impl Into<Arc<[IpNet]>>) -> Self {
        self.trusted_proxies = Some(proxies.into());
        self
    }
}

/// Identifies the client behind a request.
///
/// The first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer address if the
/// server recorded one. Header values must be routable addresses: anything that does
/// not parse, or names loopback or the unspecified address, is skipped. With
/// `trusted_proxies` set, headers count only when the peer is one of those proxies.
pub(crate) fn client_id<B>(req: &Request<B>, trusted_proxies: Option<&[IpNet]>) -> String {
    let peer = peer_addr(req).map(|addr| addr.ip().to_canonical());
    let honour_headers = match trusted_proxies {
        None => true,
        Some(proxies) => peer.is_some_and(|ip| proxies.iter().any(|net| net.contains(&ip))),
    };

    if honour_headers {
        let forwarded = header(req, "x-forwarded-for")
            .and_then(|v| v.split(',').map(str::trim).find(|s| !s.is_empty()))
            .and_then(forwarded_addr);
        if let Some(ip) = forwarded.or_else(|| header(req, "x-real-ip").and_then(forwarded_addr)) {
            return ip.to_string();
        }
    }
    match peer {
        Some(ip) => ip.to_string(),
        None => UNKNOWN_CLIENT.to_owned(),
    }
}

/// A client address taken from a proxy header, rejecting spoofed local values.
fn forwarded_addr(value: &str) -> Option<IpAddr> {
    let ip = value.parse::<IpAddr>().ok()?.to_canonical();
    if ip.is_loopback() || ip.is_unspecified() {
        debug!(value, "ignoring local address in proxy header");
        return None;
    }
    Some(ip)
}

fn header<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(not(feature = "axum"))]
fn peer_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions().get::<SocketAddr>().copied()
}

#[cfg(feature = "axum")]
fn peer_addr<B>(req: &Request<B>) -> Option<SocketAddr> {
    req.extensions().get::<SocketAddr>().copied().or_else(|| {
        req.extensions()
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|info| info.0)
    })
}
