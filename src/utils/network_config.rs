//! Network Configuration
//!
//! Trusted RPC endpoint whitelist and the endpoint health cache fed by the
//! RPC health monitor.

use crate::error::{GuardError, GuardResult};
use crate::utils::clock::{elapsed_between, Clock};
use crate::utils::sanitize::validate_https_url;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// RPC URLs trusted out of the box
pub const DEFAULT_TRUSTED_RPC_URLS: &[&str] = &[
    "https://mainnet.infura.io",
    "https://eth-mainnet.alchemyapi.io",
    "https://cloudflare-eth.com",
    "https://rpc.ankr.com/eth",
    "https://ethereum.publicnode.com",
    "https://polygon-rpc.com",
    "https://arb1.arbitrum.io/rpc",
    "https://mainnet.optimism.io",
];

/// Exact-match whitelist of RPC URLs
#[derive(Debug)]
pub struct RpcWhitelist {
    urls: RwLock<HashSet<String>>,
}

impl RpcWhitelist {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: RwLock::new(urls.into_iter().map(Into::into).collect()),
        }
    }

    /// Exact string match, no normalization
    pub fn is_trusted(&self, url: &str) -> bool {
        let Ok(urls) = self.urls.read() else { return false };
        urls.contains(url)
    }

    /// Add a URL; it must be a credential-free https URL
    pub fn trust(&self, url: &str) -> GuardResult<()> {
        validate_https_url(url)?;
        let mut urls = self
            .urls
            .write()
            .map_err(|_| GuardError::internal("Whitelist lock poisoned"))?;
        urls.insert(url.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.urls.read().map(|u| u.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RpcWhitelist {
    fn default() -> Self {
        Self::new(DEFAULT_TRUSTED_RPC_URLS.iter().copied())
    }
}

/// Endpoint health status
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointHealth {
    pub url: String,
    pub is_healthy: bool,
    pub last_check: DateTime<Utc>,
    pub last_error: Option<String>,
    pub error_count: u32,
    pub success_count: u32,
    pub consecutive_failures: u32,
}

/// Health results per endpoint URL
#[derive(Debug)]
pub struct EndpointHealthCache {
    entries: RwLock<HashMap<String, EndpointHealth>>,
    clock: Arc<dyn Clock>,
}

impl EndpointHealthCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Record the outcome of one validation round
    pub fn update(&self, url: &str, outcome: Result<(), &GuardError>) {
        let now = self.clock.now();
        let Ok(mut cache) = self.entries.write() else { return };
        let entry = cache.entry(url.to_string()).or_insert_with(|| EndpointHealth {
            url: url.to_string(),
            is_healthy: true,
            last_check: now,
            last_error: None,
            error_count: 0,
            success_count: 0,
            consecutive_failures: 0,
        });

        entry.last_check = now;
        match outcome {
            Ok(()) => {
                entry.is_healthy = true;
                entry.last_error = None;
                entry.success_count += 1;
                entry.consecutive_failures = 0;
            }
            Err(err) => {
                entry.is_healthy = false;
                entry.last_error = Some(err.to_string());
                entry.error_count += 1;
                entry.consecutive_failures += 1;
            }
        }
    }

    pub fn get(&self, url: &str) -> Option<EndpointHealth> {
        let cache = self.entries.read().ok()?;
        cache.get(url).cloned()
    }

    /// True when there is no result yet or the last one is older than `max_age`
    pub fn is_stale(&self, url: &str, max_age: Duration) -> bool {
        match self.get(url) {
            Some(health) => elapsed_between(health.last_check, self.clock.now()) > max_age,
            None => true,
        }
    }

    pub fn unhealthy(&self) -> Vec<EndpointHealth> {
        let Ok(cache) = self.entries.read() else { return Vec::new() };
        cache.values().filter(|h| !h.is_healthy).cloned().collect()
    }
}
