//! Threat Detection
//!
//! Pattern-based detection of suspicious activity:
//! - Velocity checks over recent transaction history
//! - Unusually large amounts
//! - Failed-attempt lockout per actor

use crate::error::{GuardError, GuardResult};
use crate::types::TxRecord;
use crate::utils::clock::{elapsed_between, Clock};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Threat detection configuration
#[derive(Debug, Clone)]
pub struct ThreatConfig {
    /// Transactions allowed inside `activity_window`
    pub max_transaction_rate: u32,
    /// Largest single value (wei) before it is flagged
    pub max_transaction_value: u128,
    pub activity_window: Duration,
    /// Consecutive failures that lock an actor
    pub max_failed_attempts: u32,
}

impl Default for ThreatConfig {
    fn default() -> Self {
        Self {
            max_transaction_rate: 10,
            max_transaction_value: 100_000_000_000_000_000_000,
            activity_window: Duration::from_secs(60),
            max_failed_attempts: 3,
        }
    }
}

/// Types of threats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    /// Too many transactions inside the activity window
    RapidTransactions,
    /// Single transaction above the value ceiling
    UnusualAmount,
}

/// Individual threat indicator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatIndicator {
    pub threat_type: ThreatType,
    pub description: String,
    pub evidence: Option<String>,
}

impl ThreatIndicator {
    pub fn into_error(self) -> GuardError {
        let err = GuardError::suspicious_activity(self.description);
        match self.evidence {
            Some(evidence) => err.with_details(evidence),
            None => err,
        }
    }
}

/// Failed-attempt counter for one actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedAttempts {
    pub count: u32,
    pub last_failure: DateTime<Utc>,
}

/// Suspicious activity detector
#[derive(Debug)]
pub struct SuspiciousActivityDetector {
    failed_attempts: DashMap<String, FailedAttempts>,
    config: ThreatConfig,
    clock: Arc<dyn Clock>,
}

impl SuspiciousActivityDetector {
    pub fn new(config: ThreatConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            failed_attempts: DashMap::new(),
            config,
            clock,
        }
    }

    // =========================================================================
    // Transaction patterns
    // =========================================================================

    /// Every indicator raised by `records`, rapid transactions first
    pub fn assess(&self, records: &[TxRecord]) -> Vec<ThreatIndicator> {
        let mut threats = Vec::new();

        if let Some(threat) = self.check_velocity(records) {
            threats.push(threat);
        }
        if let Some(threat) = self.check_amounts(records) {
            threats.push(threat);
        }

        threats
    }

    /// Fail with the first indicator raised by `records`
    pub fn detect(&self, records: &[TxRecord]) -> GuardResult<()> {
        match self.assess(records).into_iter().next() {
            Some(threat) => Err(threat.into_error()),
            None => Ok(()),
        }
    }

    fn check_velocity(&self, records: &[TxRecord]) -> Option<ThreatIndicator> {
        let cutoff = self.clock.unix_seconds() - self.config.activity_window.as_secs_f64();
        // Records without a timestamp are never recent
        let recent = records
            .iter()
            .filter(|r| r.timestamp.unwrap_or(0.0) > cutoff)
            .count();

        if recent > self.config.max_transaction_rate as usize {
            return Some(ThreatIndicator {
                threat_type: ThreatType::RapidTransactions,
                description: "rapid transactions detected".to_string(),
                evidence: Some(format!(
                    "{} transactions in the last {}s (limit {})",
                    recent,
                    self.config.activity_window.as_secs(),
                    self.config.max_transaction_rate
                )),
            });
        }
        None
    }

    fn check_amounts(&self, records: &[TxRecord]) -> Option<ThreatIndicator> {
        let ceiling = i128::try_from(self.config.max_transaction_value).unwrap_or(i128::MAX);
        // Unparsable values count as zero here
        let largest = records
            .iter()
            .filter_map(|r| r.value.as_ref())
            .map(|v| v.to_i128().unwrap_or(0))
            .find(|v| *v > ceiling)?;

        Some(ThreatIndicator {
            threat_type: ThreatType::UnusualAmount,
            description: "unusual amount detected".to_string(),
            evidence: Some(format!("value {} exceeds {}", largest, ceiling)),
        })
    }

    // =========================================================================
    // Failed attempts
    // =========================================================================

    /// Count a failure for `actor`.
    ///
    /// Returns `Ok(false)` while below the threshold. The call that reaches the
    /// threshold, and every call after it until a reset, fails.
    pub fn track_failed_attempt(&self, actor: &str) -> GuardResult<bool> {
        let now = self.clock.now();
        let limit = self.config.max_failed_attempts;

        let count = {
            let mut entry = self
                .failed_attempts
                .entry(actor.to_string())
                .or_insert(FailedAttempts { count: 0, last_failure: now });
            entry.count = (entry.count + 1).min(limit);
            entry.last_failure = now;
            entry.count
        };

        if count >= limit {
            return Err(GuardError::suspicious_activity(format!(
                "account locked after {} failed attempts",
                limit
            )));
        }
        Ok(false)
    }

    pub fn reset_failed_attempts(&self, actor: &str) {
        self.failed_attempts.remove(actor);
    }

    pub fn failed_attempts(&self, actor: &str) -> u32 {
        self.failed_attempts.get(actor).map(|e| e.count).unwrap_or(0)
    }

    pub fn is_locked(&self, actor: &str) -> bool {
        self.failed_attempts(actor) >= self.config.max_failed_attempts
    }

    /// Drop counters whose last failure is older than `idle`
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let now = self.clock.now();
        let before = self.failed_attempts.len();
        self.failed_attempts
            .retain(|_, entry| elapsed_between(entry.last_failure, now) <= idle);
        before - self.failed_attempts.len()
    }

    pub fn config(&self) -> &ThreatConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::utils::clock::ManualClock;

    fn detector(config: ThreatConfig) -> (SuspiciousActivityDetector, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (SuspiciousActivityDetector::new(config, clock.clone()), clock)
    }

    #[test]
    fn test_failed_attempt_lockout() {
        let (detector, _) = detector(ThreatConfig::default());

        assert_eq!(detector.track_failed_attempt("alice").unwrap(), false);
        assert_eq!(detector.track_failed_attempt("alice").unwrap(), false);
        let err = detector.track_failed_attempt("alice").unwrap_err();
        assert_eq!(err.code, ErrorCode::SuspiciousActivity);
        assert_eq!(err.message, "account locked after 3 failed attempts");
        assert!(detector.is_locked("alice"));

        // Stays locked and the counter does not grow past the threshold
        assert!(detector.track_failed_attempt("alice").is_err());
        assert_eq!(detector.failed_attempts("alice"), 3);

        detector.reset_failed_attempts("alice");
        assert_eq!(detector.failed_attempts("alice"), 0);
        assert!(detector.track_failed_attempt("alice").is_ok());
    }

    #[test]
    fn test_actors_are_independent() {
        let (detector, _) = detector(ThreatConfig {
            max_failed_attempts: 1,
            ..Default::default()
        });
        assert!(detector.track_failed_attempt("alice").is_err());
        assert!(!detector.is_locked("bob"));
    }

    #[test]
    fn test_rapid_transactions() {
        let (detector, clock) = detector(ThreatConfig {
            max_transaction_rate: 3,
            ..Default::default()
        });
        let now = clock.unix_seconds();

        let records: Vec<TxRecord> = (0..4).map(|i| TxRecord::at(now - i as f64)).collect();
        let err = detector.detect(&records).unwrap_err();
        assert_eq!(err.message, "rapid transactions detected");

        // Same count, but one falls outside the window
        let mut records = records;
        records[3] = TxRecord::at(now - 61.0);
        assert!(detector.detect(&records).is_ok());
    }

    #[test]
    fn test_missing_timestamp_is_not_recent() {
        let (detector, _) = detector(ThreatConfig {
            max_transaction_rate: 1,
            ..Default::default()
        });
        let records = vec![TxRecord::default(), TxRecord::default()];
        assert!(detector.detect(&records).is_ok());
    }

    #[test]
    fn test_unusual_amount() {
        let (detector, clock) = detector(ThreatConfig::default());
        let old = clock.unix_seconds() - 3600.0;

        let records = vec![TxRecord::new("200000000000000000000", old)];
        let err = detector.detect(&records).unwrap_err();
        assert_eq!(err.message, "unusual amount detected");

        // At the ceiling is fine, garbage counts as zero
        let records = vec![
            TxRecord::new(100_000_000_000_000_000_000u128, old),
            TxRecord::new("lots", old),
        ];
        assert!(detector.detect(&records).is_ok());
    }

    #[test]
    fn test_rapid_reported_before_amount() {
        let (detector, clock) = detector(ThreatConfig {
            max_transaction_rate: 1,
            ..Default::default()
        });
        let now = clock.unix_seconds();
        let records = vec![
            TxRecord::new(1_000_000_000_000_000_000_000u128, now),
            TxRecord::new(1_000_000_000_000_000_000_000u128, now),
        ];

        let threats = detector.assess(&records);
        assert_eq!(threats.len(), 2);
        assert_eq!(threats[0].threat_type, ThreatType::RapidTransactions);
        assert_eq!(detector.detect(&records).unwrap_err().message, "rapid transactions detected");
    }

    #[test]
    fn test_evict_idle_counters() {
        let (detector, clock) = detector(ThreatConfig::default());
        detector.track_failed_attempt("alice").unwrap();
        clock.advance(Duration::from_secs(3600));
        detector.track_failed_attempt("bob").unwrap();

        assert_eq!(detector.evict_idle(Duration::from_secs(1800)), 1);
        assert_eq!(detector.failed_attempts("alice"), 0);
        assert_eq!(detector.failed_attempts("bob"), 1);
    }
}
