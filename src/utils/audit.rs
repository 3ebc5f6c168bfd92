//! Audit Logging
//!
//! In-memory audit trail for every security decision:
//! - Tamper-evident log entries (hash chain)
//! - Severity classification by event kind
//! - Sensitive detail redaction
//! - Pluggable sinks for external collectors (metrics, alerting)

use crate::error::{GuardError, GuardResult};
use crate::utils::logging::redact_if_sensitive;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;

/// Audit severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl AuditSeverity {
    /// Severity implied by an event kind.
    ///
    /// `phishing` events are threats, `violation` events are warnings,
    /// everything else is informational.
    pub fn classify(kind: &str) -> Self {
        let kind = kind.to_ascii_lowercase();
        if kind.contains("phishing") {
            AuditSeverity::Error
        } else if kind.contains("violation") {
            AuditSeverity::Warning
        } else {
            AuditSeverity::Info
        }
    }
}

/// Event-specific key/value details
pub type EventDetails = BTreeMap<String, String>;

/// A single security decision or anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: String,
    pub severity: AuditSeverity,
    pub actor: Option<String>,
    pub details: EventDetails,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    /// New event with severity derived from `kind`
    pub fn new(kind: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let kind = kind.into();
        Self {
            severity: AuditSeverity::classify(&kind),
            kind,
            actor: None,
            details: EventDetails::new(),
            timestamp,
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    pub fn details(mut self, details: EventDetails) -> Self {
        self.details.extend(details);
        self
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Receiver for security events outside the core (metrics collectors, alerting)
pub trait SecurityEventSink: Send + Sync {
    fn record(&self, event: &SecurityEvent);
}

/// Sink that counts events by kind
#[derive(Debug, Default)]
pub struct EventCounter {
    counts: DashMap<String, u64>,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: &str) -> u64 {
        self.counts.get(kind).map(|c| *c).unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| *c.value()).sum()
    }
}

impl SecurityEventSink for EventCounter {
    fn record(&self, event: &SecurityEvent) {
        *self.counts.entry(event.kind.clone()).or_insert(0) += 1;
    }
}

/// Audit configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Maximum entries to keep in memory
    pub max_entries: usize,
    /// Whether to hash-chain entries for tamper detection
    pub hash_chain_enabled: bool,
    /// Whether to redact sensitive data
    pub redact_sensitive: bool,
    /// Minimum severity to log
    pub min_severity: AuditSeverity,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_entries: 10000,
            hash_chain_enabled: true,
            redact_sensitive: true,
            min_severity: AuditSeverity::Info,
        }
    }
}

/// Audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub severity: AuditSeverity,
    pub actor: Option<String>,
    pub details: EventDetails,
    /// Hash of this entry + previous hash (for tamper detection)
    pub hash: String,
    pub prev_hash: String,
}

/// Integrity verification result
#[derive(Debug, Clone)]
pub struct IntegrityResult {
    pub is_valid: bool,
    pub entries_checked: usize,
    pub first_invalid_id: Option<u64>,
    pub message: String,
}

/// Hash-chained ring buffer of security events
#[derive(Debug)]
pub struct AuditLog {
    entries: RwLock<VecDeque<AuditEntry>>,
    config: AuditConfig,
    last_hash: RwLock<[u8; 32]>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_config(AuditConfig::default())
    }

    pub fn with_config(config: AuditConfig) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(config.max_entries.min(1024))),
            config,
            last_hash: RwLock::new([0u8; 32]),
        }
    }

    /// Append an event
    pub fn record(&self, event: &SecurityEvent) {
        if event.severity < self.config.min_severity {
            return;
        }

        // If poisoned, skip (non-critical path)
        let Ok(mut entries) = self.entries.write() else { return };
        let Ok(mut last_hash) = self.last_hash.write() else { return };

        let id = entries.back().map(|e| e.id + 1).unwrap_or(1);

        let details = if self.config.redact_sensitive {
            redact_details(&event.details)
        } else {
            event.details.clone()
        };

        let mut entry = AuditEntry {
            id,
            timestamp: event.timestamp,
            kind: event.kind.clone(),
            severity: event.severity,
            actor: event.actor.clone(),
            details,
            hash: String::new(),
            prev_hash: hex::encode(*last_hash),
        };

        if self.config.hash_chain_enabled {
            let hash = compute_hash(&entry, &last_hash);
            entry.hash = hex::encode(hash);
            *last_hash = hash;
        }

        if entries.len() >= self.config.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Verify hash chain integrity.
    ///
    /// Starts from the oldest retained entry, so a rotated ring buffer still verifies.
    pub fn verify_integrity(&self) -> IntegrityResult {
        let Ok(entries) = self.entries.read() else {
            return IntegrityResult {
                is_valid: false,
                entries_checked: 0,
                first_invalid_id: None,
                message: "Failed to acquire lock".to_string(),
            };
        };

        let Some(first) = entries.front() else {
            return IntegrityResult {
                is_valid: true,
                entries_checked: 0,
                first_invalid_id: None,
                message: "No entries to verify".to_string(),
            };
        };

        let mut prev_hash = [0u8; 32];
        if let Ok(bytes) = hex::decode(&first.prev_hash) {
            if bytes.len() == 32 {
                prev_hash.copy_from_slice(&bytes);
            }
        }

        let mut entries_checked = 0;
        for entry in entries.iter() {
            if self.config.hash_chain_enabled {
                let expected = compute_hash(entry, &prev_hash);
                if entry.hash != hex::encode(expected) || entry.prev_hash != hex::encode(prev_hash) {
                    return IntegrityResult {
                        is_valid: false,
                        entries_checked,
                        first_invalid_id: Some(entry.id),
                        message: format!("Hash mismatch at entry {}", entry.id),
                    };
                }
                prev_hash = expected;
            }
            entries_checked += 1;
        }

        IntegrityResult {
            is_valid: true,
            entries_checked,
            first_invalid_id: None,
            message: "All entries verified".to_string(),
        }
    }

    pub fn query_by_kind(&self, kind: &str) -> Vec<AuditEntry> {
        self.filtered(|e| e.kind == kind)
    }

    /// Entries at or above `min_severity`
    pub fn query_by_severity(&self, min_severity: AuditSeverity) -> Vec<AuditEntry> {
        self.filtered(|e| e.severity >= min_severity)
    }

    pub fn query_by_actor(&self, actor: &str) -> Vec<AuditEntry> {
        self.filtered(|e| e.actor.as_deref() == Some(actor))
    }

    /// Most recent entries, newest first
    pub fn recent(&self, count: usize) -> Vec<AuditEntry> {
        let Ok(entries) = self.entries.read() else { return Vec::new() };
        entries.iter().rev().take(count).cloned().collect()
    }

    fn filtered(&self, predicate: impl Fn(&AuditEntry) -> bool) -> Vec<AuditEntry> {
        let Ok(entries) = self.entries.read() else { return Vec::new() };
        entries.iter().filter(|e| predicate(e)).cloned().collect()
    }

    /// Export all entries as JSON
    pub fn export_json(&self) -> GuardResult<String> {
        let entries = self
            .entries
            .read()
            .map_err(|_| GuardError::internal("Failed to acquire audit log lock"))?;
        let vec: Vec<_> = entries.iter().collect();
        serde_json::to_string_pretty(&vec)
            .map_err(|e| GuardError::internal(format!("Failed to export audit log: {}", e)))
    }

    pub fn count(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        let Ok(mut entries) = self.entries.write() else { return };
        entries.clear();

        let Ok(mut last_hash) = self.last_hash.write() else { return };
        *last_hash = [0u8; 32];
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

fn compute_hash(entry: &AuditEntry, prev_hash: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(entry.id.to_le_bytes());
    hasher.update(entry.timestamp.timestamp_micros().to_le_bytes());
    hasher.update(entry.kind.as_bytes());
    hasher.update(format!("{:?}", entry.severity).as_bytes());
    hasher.update(entry.actor.as_deref().unwrap_or("").as_bytes());
    for (key, value) in &entry.details {
        hasher.update(key.as_bytes());
        hasher.update([0u8]);
        hasher.update(value.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(prev_hash);
    hasher.finalize().into()
}

fn redact_details(details: &EventDetails) -> EventDetails {
    details
        .iter()
        .map(|(k, v)| (k.clone(), redact_if_sensitive(k, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: &str) -> SecurityEvent {
        SecurityEvent::new(kind, Utc::now())
    }

    #[test]
    fn test_audit_log_basic() {
        let log = AuditLog::new();
        log.record(&event("session_created").actor("wallet_123"));

        assert_eq!(log.count(), 1);
        let entries = log.recent(1);
        assert_eq!(entries[0].kind, "session_created");
        assert_eq!(entries[0].actor.as_deref(), Some("wallet_123"));
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(AuditSeverity::classify("phishing_detected"), AuditSeverity::Error);
        assert_eq!(AuditSeverity::classify("rate_limit_violation"), AuditSeverity::Warning);
        assert_eq!(AuditSeverity::classify("transaction_verified"), AuditSeverity::Info);
    }

    #[test]
    fn test_hash_chain_integrity() {
        let log = AuditLog::new();
        for i in 0..10 {
            log.record(&event("transaction_verified").detail("tx", i));
        }

        let result = log.verify_integrity();
        assert!(result.is_valid);
        assert_eq!(result.entries_checked, 10);
    }

    #[test]
    fn test_tampering_detected() {
        let log = AuditLog::new();
        for i in 0..3 {
            log.record(&event("transaction_verified").detail("tx", i));
        }
        {
            let mut entries = log.entries.write().unwrap();
            entries[1].actor = Some("mallory".to_string());
        }

        let result = log.verify_integrity();
        assert!(!result.is_valid);
        assert_eq!(result.first_invalid_id, Some(2));
    }

    #[test]
    fn test_redaction() {
        let log = AuditLog::new();
        log.record(
            &event("signature_verified")
                .detail("signature", "0x1234567890abcdef")
                .detail("to", "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045")
                .detail("reason", "ok"),
        );

        let entry = &log.recent(1)[0];
        assert!(entry.details["signature"].contains("REDACTED"));
        assert!(entry.details["to"].contains("..."));
        assert_eq!(entry.details["reason"], "ok");
    }

    #[test]
    fn test_query_by_severity() {
        let log = AuditLog::new();
        log.record(&event("session_created"));
        log.record(&event("session_violation"));
        log.record(&event("phishing_detected"));

        let warnings = log.query_by_severity(AuditSeverity::Warning);
        assert_eq!(warnings.len(), 2);
        assert_eq!(log.query_by_kind("phishing_detected").len(), 1);
    }

    #[test]
    fn test_ring_buffer() {
        let config = AuditConfig {
            max_entries: 5,
            ..Default::default()
        };
        let log = AuditLog::with_config(config);
        for i in 0..10 {
            log.record(&event("transaction_verified").detail("tx", format!("tx_{}", i)));
        }

        assert_eq!(log.count(), 5);
        let recent = log.recent(5);
        assert_eq!(recent[0].details["tx"], "tx_9");
        assert!(log.verify_integrity().is_valid);
    }

    #[test]
    fn test_min_severity_filter() {
        let log = AuditLog::with_config(AuditConfig {
            min_severity: AuditSeverity::Warning,
            ..Default::default()
        });
        log.record(&event("session_created"));
        log.record(&event("rate_limit_violation"));
        assert_eq!(log.count(), 1);
    }

    #[test]
    fn test_event_counter_sink() {
        let counter = EventCounter::new();
        counter.record(&event("phishing_detected"));
        counter.record(&event("phishing_detected"));
        counter.record(&event("session_created"));
        assert_eq!(counter.count("phishing_detected"), 2);
        assert_eq!(counter.total(), 3);
    }

    #[test]
    fn test_export_json() {
        let log = AuditLog::new();
        log.record(&event("session_created"));

        let json = log.export_json().unwrap();
        assert!(json.contains("session_created"));
    }
}
