//! Bot identity classification.
//!
//! The limiter only depends on the four-way [`BotStatus`] contract exposed by a
//! [`Classifier`]. [`KnownBots`] is the built-in implementation: an allow-list of
//! well-known crawlers and the address ranges their operators publish.

use std::fmt::Debug;
use std::net::IpAddr;

use ipnet::IpNet;

use crate::BotrateError;

/// Outcome of verifying a client that claims to be a crawler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotStatus {
    /// The claim was confirmed.
    Verified,
    /// Verification could not complete right now. Treated as benign and retried on
    /// the next request.
    Pending,
    /// The claim was checked and is false.
    Failed,
    /// The claim could not be checked at all.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_bot: bool,
    pub status: BotStatus,
}

impl Classification {
    /// A client that does not claim to be a crawler.
    pub const fn human() -> Self {
        Self {
            is_bot: false,
            status: BotStatus::Unknown,
        }
    }

    pub const fn bot(status: BotStatus) -> Self {
        Self {
            is_bot: true,
            status,
        }
    }
}

/// Classifies a `(user agent, client id)` pair.
///
/// Called synchronously for every request, so implementations should be cheap.
/// Any retry or caching of slow lookups belongs inside the implementation.
pub trait Classifier: Debug + Send + Sync {
    fn validate(&self, user_agent: &str, client_id: &str) -> Classification;
}

/// Parses a CIDR block, or a bare address as a single-host network.
fn parse_range(cidr: &str) -> Result<IpNet, String> {
    let cidr = cidr.trim();
    match cidr.parse::<IpNet>() {
        Ok(net) => Ok(net),
        Err(e) => cidr
            .parse::<IpAddr>()
            .map(IpNet::from)
            .map_err(|_| format!("invalid range {cidr:?}: {e}")),
    }
}

/// A crawler the classifier knows how to verify.
#[derive(Debug, Clone)]
pub struct BotRule {
    name: String,
    token: String,
    ranges: Vec<IpNet>,
}

impl BotRule {
    /// Creates a rule matching user agents containing `token` (ASCII case-insensitive).
    ///
    /// `ranges` are the CIDR blocks the crawler's operator publishes. A rule without
    /// ranges cannot be verified locally and always classifies as [`BotStatus::Pending`].
    ///
    /// # Errors
    ///
    /// Returns [`BotrateError::Classifier`] if the token is empty or a range is malformed.
    pub fn new(name: &str, token: &str, ranges: &[&str]) -> Result<Self, BotrateError> {
        if token.is_empty() {
            return Err(BotrateError::Classifier(format!(
                "rule {name:?} has an empty user agent token"
            )));
        }
        let ranges = ranges
            .iter()
            .map(|cidr| parse_range(cidr))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| BotrateError::Classifier(format!("rule {name:?}: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            token: token.to_ascii_lowercase(),
            ranges,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, user_agent: &str) -> bool {
        contains_ignore_ascii_case(user_agent.as_bytes(), self.token.as_bytes())
    }

    fn verify(&self, client_id: &str) -> BotStatus {
        if self.ranges.is_empty() {
            return BotStatus::Pending;
        }
        match client_id.trim().parse::<IpAddr>() {
            Ok(ip) => {
                // IPv4-mapped IPv6 clients are checked against the IPv4 ranges.
                let ip = ip.to_canonical();
                if self.ranges.iter().any(|net| net.contains(&ip)) {
                    BotStatus::Verified
                } else {
                    BotStatus::Failed
                }
            }
            Err(_) => BotStatus::Unknown,
        }
    }
}

const BUILTIN_RULES: &[(&str, &str, &[&str])] = &[
    (
        "Googlebot",
        "googlebot",
        &["66.249.64.0/19", "2001:4860:4801::/48"],
    ),
    (
        "Bingbot",
        "bingbot",
        &["157.55.39.0/24", "207.46.13.0/24", "40.77.167.0/24"],
    ),
    ("Applebot", "applebot", &["17.0.0.0/8"]),
    (
        "DuckDuckBot",
        "duckduckbot",
        &["20.191.45.212/32", "40.88.21.235/32"],
    ),
];

/// Allow-list classifier over well-known crawlers.
#[derive(Debug, Clone)]
pub struct KnownBots {
    rules: Vec<BotRule>,
}

impl KnownBots {
    /// Creates a classifier with the built-in crawler table.
    pub fn new() -> Result<Self, BotrateError> {
        let rules = BUILTIN_RULES
            .iter()
            .map(|(name, token, ranges)| BotRule::new(name, token, ranges))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Creates a classifier from an explicit rule set, replacing the built-in table.
    pub fn with_rules(rules: Vec<BotRule>) -> Self {
        Self { rules }
    }

    /// Adds a rule, consulted after the existing ones.
    pub fn push(&mut self, rule: BotRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[BotRule] {
        &self.rules
    }
}

impl Classifier for KnownBots {
    fn validate(&self, user_agent: &str, client_id: &str) -> Classification {
        match self.rules.iter().find(|rule| rule.matches(user_agent)) {
            Some(rule) => Classification::bot(rule.verify(client_id)),
            None => Classification::human(),
        }
    }
}

fn contains_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty()
        || haystack
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle))
}
