use std::sync::Arc;
use std::time::Duration;

use botrate::Limiter;
use ipnet::IpNet;
use tower::Layer;

use crate::service::BotRateService;

/// Applies bot-aware admission control to requests.
#[derive(Debug, Clone)]
pub struct BotRateLayer {
    limiter: Arc<Limiter>,
    timeout: Option<Duration>,
    trusted_proxies: Option<Arc<[IpNet]>>,
}

impl BotRateLayer {
    /// Create a BotRateLayer that rejects throttled clients immediately.
    pub fn new(limiter: Arc<Limiter>) -> Self {
        BotRateLayer {
            limiter,
            timeout: None,
            trusted_proxies: None,
        }
    }

    /// Let throttled clients wait up to `timeout` for their next token instead of
    /// being rejected straight away.
    ///
    /// A client whose next token is further away than `timeout` is still rejected
    /// immediately with `BotRateError::RateLimited`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Honour `X-Forwarded-For` and `X-Real-IP` only from these proxies.
    ///
    /// Requests from any other peer, or with no recorded peer address, are
    /// identified by the peer address alone. Without this, proxy headers are
    /// honoured from every peer.
    pub fn with_trusted_proxies(mut self, proxies: impl IntoIterator<Item = IpNet>) -> Self {
        self.trusted_proxies = Some(proxies.into_iter().collect());
        self
    }
}

impl<S> Layer<S> for BotRateLayer {
    type Service = BotRateService<S>;

    fn layer(&self, service: S) -> Self::Service {
        let mut svc = BotRateService::new(service, Arc::clone(&self.limiter));
        if let Some(timeout) = self.timeout {
            svc = svc.with_timeout(timeout);
        }
        if let Some(proxies) = &self.trusted_proxies {
            svc = svc.with_trusted_proxies(Arc::clone(proxies));
        }
        svc
    }
}
