//! Signature Replay Protection
//!
//! Every signature presented for verification is remembered. Presenting the
//! same signature string again is rejected, whatever the first verdict was.
//!
//! Validity itself is a placeholder heuristic: signatures containing the
//! marker `invalid` are rejected. Real ECDSA recovery belongs behind
//! `SignatureReplayCache::check` once a signer backend is wired in.

use crate::utils::clock::{elapsed_between, Clock};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Marker treated as a forged signature by the placeholder check
const INVALID_MARKER: &str = "invalid";

/// Outcome of a signature check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureVerdict {
    /// First use, accepted
    Valid,
    /// First use, rejected by the validity check
    Invalid,
    /// Seen before
    Replayed,
    /// Empty signature, not cached
    Empty,
}

impl SignatureVerdict {
    pub fn is_valid(self) -> bool {
        self == SignatureVerdict::Valid
    }
}

/// Cached first-seen verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub valid: bool,
    pub first_seen: DateTime<Utc>,
}

/// Signature → first verdict. Entries are never updated.
#[derive(Debug)]
pub struct SignatureReplayCache {
    entries: DashMap<String, CacheEntry>,
    /// None keeps entries for the process lifetime
    ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
}

impl SignatureReplayCache {
    pub fn new(ttl: Option<Duration>, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Check a signature and remember it.
    ///
    /// The lookup and the insert happen under one shard lock, so two
    /// concurrent presentations of the same signature cannot both pass.
    pub fn check(&self, signature: &str) -> SignatureVerdict {
        // Empty signatures fail closed and never enter the cache
        if signature.is_empty() {
            return SignatureVerdict::Empty;
        }

        let now = self.clock.now();
        match self.entries.entry(signature.to_string()) {
            Entry::Occupied(mut occupied) => {
                if self.is_expired(occupied.get(), now) {
                    let valid = placeholder_validity(signature);
                    occupied.insert(CacheEntry { valid, first_seen: now });
                    verdict(valid)
                } else {
                    SignatureVerdict::Replayed
                }
            }
            Entry::Vacant(vacant) => {
                let valid = placeholder_validity(signature);
                vacant.insert(CacheEntry { valid, first_seen: now });
                verdict(valid)
            }
        }
    }

    pub fn contains(&self, signature: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(signature)
            .is_some_and(|entry| !self.is_expired(&entry, now))
    }

    pub fn get(&self, signature: &str) -> Option<CacheEntry> {
        self.entries.get(signature).map(|e| *e)
    }

    /// Drop entries older than the TTL. No-op without a TTL.
    pub fn purge_expired(&self) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.is_expired(entry, now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        self.ttl
            .is_some_and(|ttl| elapsed_between(entry.first_seen, now) > ttl)
    }
}

fn placeholder_validity(signature: &str) -> bool {
    !signature.contains(INVALID_MARKER)
}

fn verdict(valid: bool) -> SignatureVerdict {
    if valid {
        SignatureVerdict::Valid
    } else {
        SignatureVerdict::Invalid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;

    fn cache(ttl: Option<Duration>) -> (SignatureReplayCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (SignatureReplayCache::new(ttl, clock.clone()), clock)
    }

    #[test]
    fn test_first_use_then_replay() {
        let (cache, _) = cache(None);
        assert_eq!(cache.check("0xabc123"), SignatureVerdict::Valid);
        assert_eq!(cache.check("0xabc123"), SignatureVerdict::Replayed);
        assert!(cache.contains("0xabc123"));
    }

    #[test]
    fn test_invalid_signature_is_cached() {
        let (cache, _) = cache(None);
        assert_eq!(cache.check("0xinvalid"), SignatureVerdict::Invalid);
        assert_eq!(cache.check("0xinvalid"), SignatureVerdict::Replayed);
        assert!(!cache.get("0xinvalid").unwrap().valid);
    }

    #[test]
    fn test_empty_signature_not_cached() {
        let (cache, _) = cache(None);
        assert_eq!(cache.check(""), SignatureVerdict::Empty);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let (cache, clock) = cache(None);
        cache.check("0xabc");
        clock.advance(Duration::from_secs(365 * 24 * 60 * 60));
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.check("0xabc"), SignatureVerdict::Replayed);
    }

    #[test]
    fn test_ttl_eviction() {
        let (cache, clock) = cache(Some(Duration::from_secs(60)));
        cache.check("0xold");
        clock.advance(Duration::from_secs(30));
        cache.check("0xnew");
        clock.advance(Duration::from_secs(31));

        assert!(!cache.contains("0xold"));
        assert!(cache.contains("0xnew"));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_replay_single_winner() {
        let (cache, _) = cache(None);
        let cache = Arc::new(cache);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.check("0xshared"))
            })
            .collect();

        let valid = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|v| *v == SignatureVerdict::Valid)
            .count();
        assert_eq!(valid, 1);
    }
}
