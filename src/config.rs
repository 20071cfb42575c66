//! Runtime configuration.
//!
//! Defaults match what the scanning app shipped with; every field can be
//! overridden through a `GATECHECK_*` environment variable.

use std::time::Duration;

use serde::Deserialize;

/// Authority call timeout (matches the API client's 15s default).
pub const DEFAULT_AUTHORITY_TIMEOUT_MS: u64 = 15_000;

/// Rule set cache TTL - 5 minutes
pub const DEFAULT_RULE_CACHE_TTL_SECS: u64 = 300;

/// QR codes top out well below this; anything larger is not a ticket.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

pub const DEFAULT_STORAGE_NAMESPACE: &str = "@event_scanner";

/// Retry policy for sync batch submission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub base_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }
}

/// Gatekeeper configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GatekeeperConfig {
    #[serde(with = "millis")]
    pub authority_timeout: Duration,
    pub sync_retry: RetryPolicy,
    #[serde(with = "secs")]
    pub rule_cache_ttl: Duration,
    pub max_payload_bytes: usize,
    pub storage_namespace: String,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            authority_timeout: Duration::from_millis(DEFAULT_AUTHORITY_TIMEOUT_MS),
            sync_retry: RetryPolicy::default(),
            rule_cache_ttl: Duration::from_secs(DEFAULT_RULE_CACHE_TTL_SECS),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            storage_namespace: DEFAULT_STORAGE_NAMESPACE.to_string(),
        }
    }
}

impl GatekeeperConfig {
    /// Defaults overlaid with `GATECHECK_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// Overlay values from a variable lookup. Unparseable values are logged and ignored.
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = parse_var::<u64, _>(&lookup, "GATECHECK_AUTHORITY_TIMEOUT_MS") {
            self.authority_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<u32, _>(&lookup, "GATECHECK_SYNC_MAX_ATTEMPTS") {
            // zero attempts would never submit anything
            self.sync_retry.max_attempts = n.max(1);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "GATECHECK_SYNC_BASE_DELAY_MS") {
            self.sync_retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "GATECHECK_SYNC_MAX_DELAY_MS") {
            self.sync_retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "GATECHECK_RULE_CACHE_TTL_SECS") {
            self.rule_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(bytes) = parse_var::<usize, _>(&lookup, "GATECHECK_MAX_PAYLOAD_BYTES") {
            self.max_payload_bytes = bytes;
        }
        if let Some(ns) = lookup("GATECHECK_STORAGE_NAMESPACE") {
            if !ns.trim().is_empty() {
                self.storage_namespace = ns.trim().to_string();
            }
        }
        self
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("CONFIG_VALUE_IGNORED var={} value={:?}", name, raw);
            None
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
