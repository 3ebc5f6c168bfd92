//! Security Manager
//!
//! Single authorization façade over the per-actor security state. Constructed
//! once at startup and shared as `Arc<SecurityManager>` with every consumer
//! (HTTP layer, browser automation, network manager).
//!
//! Every check records its decision, pass or fail, through
//! `log_security_event` before returning.

use crate::error::{GuardError, GuardResult};
use crate::security::phishing::PhishingDetector;
use crate::security::threat_detection::{SuspiciousActivityDetector, ThreatConfig};
use crate::security::transaction::{TransactionLimits, TransactionValidator};
use crate::security::verification::{SignatureReplayCache, SignatureVerdict};
use crate::types::{SecurityRequest, Transaction, TransactionBatch};
use crate::utils::audit::{AuditLog, AuditSeverity, EventDetails, SecurityEvent, SecurityEventSink};
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::logging::{LogEntry, LogLevel};
use crate::utils::rate_limiter::SlidingWindowLimiter;
use crate::utils::sanitize::{normalize_url, sanitize_input, SanitizeResult};
use crate::utils::security_config::SecuritySettings;
use crate::utils::session::{Session, SessionStore};
use std::sync::{Arc, RwLock};

/// URL fragments that are always treated as phishing
const PHISHING_URL_FRAGMENTS: &[&str] = &["fake", "security-update"];

/// Security manager
pub struct SecurityManager {
    settings: SecuritySettings,
    clock: Arc<dyn Clock>,
    sessions: SessionStore,
    rate_limiter: SlidingWindowLimiter,
    activity: SuspiciousActivityDetector,
    signatures: SignatureReplayCache,
    validator: TransactionValidator,
    phishing: PhishingDetector,
    audit: AuditLog,
    sinks: RwLock<Vec<Arc<dyn SecurityEventSink>>>,
}

impl SecurityManager {
    /// Create a manager on the system clock
    pub fn new(settings: SecuritySettings) -> GuardResult<Self> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    /// Create a manager reading time from `clock`
    pub fn with_clock(settings: SecuritySettings, clock: Arc<dyn Clock>) -> GuardResult<Self> {
        settings.validate()?;

        for warning in settings.warnings() {
            tracing::warn!(level = ?settings.level, "{}", warning);
        }

        let threat_config = ThreatConfig {
            max_transaction_rate: settings.max_transaction_rate,
            max_transaction_value: settings.max_transaction_value,
            activity_window: settings.activity_window,
            max_failed_attempts: settings.max_failed_attempts,
        };
        let limits = TransactionLimits {
            max_transaction_value: settings.max_transaction_value,
            max_gas_price: settings.max_gas_price,
            enforce_eip55: settings.enforce_eip55,
        };

        Ok(Self {
            sessions: SessionStore::new(settings.session_timeout, clock.clone()),
            rate_limiter: SlidingWindowLimiter::new(
                settings.max_transaction_rate,
                settings.rate_window,
                clock.clone(),
            ),
            activity: SuspiciousActivityDetector::new(threat_config, clock.clone()),
            signatures: SignatureReplayCache::new(settings.signature_cache_ttl, clock.clone()),
            validator: TransactionValidator::new(limits),
            phishing: PhishingDetector::new(),
            audit: AuditLog::new(),
            sinks: RwLock::new(Vec::new()),
            settings,
            clock,
        })
    }

    pub fn settings(&self) -> &SecuritySettings {
        &self.settings
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Validate address, value, gas price and call data
    pub fn verify_transaction(&self, tx: &Transaction) -> GuardResult<bool> {
        self.verify_transaction_for(None, tx)
    }

    /// [`verify_transaction`](Self::verify_transaction) with the resulting event attributed to `actor`
    pub(crate) fn verify_transaction_for(
        &self,
        actor: Option<&str>,
        tx: &Transaction,
    ) -> GuardResult<bool> {
        let outcome = self.validator.validate(tx);
        let event = match &outcome {
            Ok(()) => self.event("transaction_verified"),
            Err(e) => self.event("transaction_violation").detail("reason", &e.message),
        }
        .detail("to", &tx.to);
        self.emit(with_actor(event, actor));

        outcome.map(|_| true)
    }

    // =========================================================================
    // Rate limiting
    // =========================================================================

    /// Record a sensitive call for `actor` and enforce the sliding window
    pub fn check_rate_limit(&self, actor: &str) -> GuardResult<bool> {
        let decision = self.rate_limiter.check(actor);

        if !decision.allowed {
            self.emit(
                self.event("rate_limit_violation")
                    .actor(actor)
                    .detail("count", decision.count)
                    .detail("limit", decision.limit),
            );
            return Err(GuardError::rate_limited("Rate limit exceeded").with_details(format!(
                "{} calls in {}s (limit {})",
                decision.count,
                self.settings.rate_window.as_secs(),
                decision.limit
            )));
        }

        self.emit(
            self.event("rate_limit_passed")
                .actor(actor)
                .detail("count", decision.count),
        );
        Ok(true)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Open a session for `actor`, returning its token
    pub fn create_session(&self, actor: &str) -> GuardResult<String> {
        let token = self.sessions.create(actor)?;
        self.emit(self.event("session_created").actor(actor));
        Ok(token)
    }

    /// Validate a token, refreshing its activity time
    pub fn validate_session(&self, token: &str) -> GuardResult<bool> {
        self.authenticate(token).map(|_| true)
    }

    /// Validate a token and return the session it belongs to
    pub fn authenticate(&self, token: &str) -> GuardResult<Session> {
        match self.sessions.validate(token) {
            Ok(session) => {
                self.emit(self.event("session_validated").actor(&session.actor));
                Ok(session)
            }
            Err(e) => {
                self.emit(self.event("session_violation").detail("reason", &e.message));
                Err(e)
            }
        }
    }

    pub fn invalidate_session(&self, token: &str) -> bool {
        let actor = self.sessions.actor_of(token);
        let removed = self.sessions.invalidate(token);
        if removed {
            self.emit(with_actor(self.event("session_invalidated"), actor.as_deref()));
        }
        removed
    }

    pub fn invalidate_actor_sessions(&self, actor: &str) -> usize {
        let removed = self.sessions.invalidate_actor(actor);
        if removed > 0 {
            self.emit(
                self.event("session_invalidated")
                    .actor(actor)
                    .detail("count", removed),
            );
        }
        removed
    }

    /// Owner of a session token, without refreshing it
    pub fn session_actor(&self, token: &str) -> Option<String> {
        self.sessions.actor_of(token)
    }

    /// Sweep expired sessions. Expiry on read stays authoritative.
    pub fn purge_expired_sessions(&self) -> usize {
        self.sessions.purge_expired()
    }

    // =========================================================================
    // Phishing & content
    // =========================================================================

    /// Reject URLs that look like phishing. No-op when phishing checks are off.
    pub fn check_phishing(&self, url: &str) -> GuardResult<bool> {
        if !self.settings.phishing_check_enabled {
            return Ok(true);
        }

        let result = self.phishing.check_url(url);
        let matched = result.matched.clone().or_else(|| {
            let lower = normalize_url(url).to_lowercase();
            PHISHING_URL_FRAGMENTS
                .iter()
                .find(|fragment| lower.contains(*fragment))
                .map(|fragment| fragment.to_string())
        });

        match matched {
            Some(matched) => {
                self.emit(
                    self.event("phishing_detected")
                        .detail("url", url)
                        .detail("matched", &matched),
                );
                Err(GuardError::phishing("Phishing attempt detected").with_details(url))
            }
            None => {
                self.emit(self.event("url_check_passed").detail("url", url));
                Ok(true)
            }
        }
    }

    /// Add domains to the phishing blocklist, returning how many were new
    pub fn update_phishing_domains<I, S>(&self, domains: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.phishing.update_phishing_domains(domains);
        self.emit(
            self.event("phishing_domains_updated")
                .severity(AuditSeverity::Info)
                .detail("added", added),
        );
        added
    }

    pub fn remove_phishing_domain(&self, domain: &str) -> bool {
        self.phishing.remove_phishing_domain(domain)
    }

    /// True if page content contains scam keywords
    pub fn analyze_content(&self, text: &str) -> bool {
        let findings = self.phishing.content_findings(text);
        if findings.is_empty() {
            return false;
        }
        self.emit(
            self.event("phishing_content_detected")
                .detail("keywords", findings.join(",")),
        );
        true
    }

    /// Strip scripts, handlers and SQL keywords, then HTML-escape
    pub fn sanitize_input(&self, input: &str) -> String {
        self.sanitize(input).value
    }

    /// Like [`sanitize_input`](Self::sanitize_input), keeping the list of applied steps
    pub fn sanitize(&self, input: &str) -> SanitizeResult<String> {
        let result = sanitize_input(input);
        if result.was_modified {
            self.emit(
                self.event("input_sanitized")
                    .detail("steps", result.modifications.join(",")),
            );
        }
        result
    }

    // =========================================================================
    // Lockout & activity
    // =========================================================================

    /// Count a failed authentication step; fails once the actor is locked out
    pub fn track_failed_attempt(&self, actor: &str) -> GuardResult<bool> {
        match self.activity.track_failed_attempt(actor) {
            Ok(locked) => {
                self.emit(
                    self.event("failed_attempt")
                        .actor(actor)
                        .detail("count", self.activity.failed_attempts(actor)),
                );
                Ok(locked)
            }
            Err(e) => {
                self.emit(
                    self.event("lockout_violation")
                        .actor(actor)
                        .detail("reason", &e.message),
                );
                Err(e)
            }
        }
    }

    /// Clear the failed-attempt counter after a successful step
    pub fn reset_failed_attempts(&self, actor: &str) {
        self.activity.reset_failed_attempts(actor);
    }

    /// Check a transaction history for rapid bursts and unusual amounts
    pub fn detect_suspicious_activity(
        &self,
        actor: &str,
        transactions: impl Into<TransactionBatch>,
    ) -> GuardResult<()> {
        let batch = transactions.into();
        let records = batch.as_slice();

        match self.activity.detect(records) {
            Ok(()) => {
                self.emit(
                    self.event("activity_check_passed")
                        .actor(actor)
                        .detail("transactions", records.len()),
                );
                Ok(())
            }
            Err(e) => {
                let mut event = self
                    .event("suspicious_activity_violation")
                    .actor(actor)
                    .detail("reason", &e.message);
                if let Some(details) = &e.details {
                    event = event.detail("evidence", details);
                }
                self.emit(event);
                Err(e)
            }
        }
    }

    // =========================================================================
    // Signatures
    // =========================================================================

    /// Verify a signature once. Any second presentation is a replay.
    pub fn verify_signature(&self, message: &str, signature: &str, address: &str) -> bool {
        let verdict = self.signatures.check(signature);
        let kind = match verdict {
            SignatureVerdict::Valid => "signature_verified",
            SignatureVerdict::Replayed => "signature_replay_violation",
            SignatureVerdict::Invalid | SignatureVerdict::Empty => "signature_violation",
        };
        self.emit(
            self.event(kind)
                .detail("address", address)
                .detail("message_len", message.len())
                .detail("verdict", format!("{:?}", verdict).to_lowercase()),
        );
        verdict.is_valid()
    }

    /// Drop replay-cache entries older than the configured TTL
    pub fn purge_expired_signatures(&self) -> usize {
        self.signatures.purge_expired()
    }

    // =========================================================================
    // Combined check
    // =========================================================================

    /// Session, rate limit, transaction, then phishing. First failure wins.
    ///
    /// The rate-limited actor is `user_id` when given, otherwise the session owner.
    pub fn comprehensive_security_check(&self, request: &SecurityRequest) -> GuardResult<bool> {
        let session = self.authenticate(&request.session_id)?;
        let actor = request.user_id.as_deref().unwrap_or(&session.actor);

        self.check_rate_limit(actor)?;

        if let Some(tx) = &request.transaction {
            self.verify_transaction_for(Some(actor), tx)?;
        }

        if let Some(url) = &request.url {
            self.check_phishing(url)?;
        }

        Ok(true)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Register an external receiver for every security event
    pub fn register_sink(&self, sink: Arc<dyn SecurityEventSink>) {
        if let Ok(mut sinks) = self.sinks.write() {
            sinks.push(sink);
        }
    }

    /// Record a security event. Severity follows the event kind. Never fails.
    pub fn log_security_event(&self, kind: &str, details: EventDetails) {
        self.emit(self.event(kind).details(details));
    }

    /// Record a prepared event
    pub fn record_event(&self, event: SecurityEvent) {
        self.emit(event);
    }

    /// Drop rate windows and failed-attempt counters idle for longer than
    /// `idle_actor_ttl`. No-op when the TTL is unset.
    pub fn purge_idle_state(&self) -> usize {
        let Some(ttl) = self.settings.idle_actor_ttl else { return 0 };
        let evicted = self.rate_limiter.evict_idle(ttl) + self.activity.evict_idle(ttl);
        if evicted > 0 {
            tracing::debug!(evicted, "evicted idle actor state");
        }
        evicted
    }

    fn event(&self, kind: &str) -> SecurityEvent {
        SecurityEvent::new(kind, self.clock.now())
    }

    fn emit(&self, event: SecurityEvent) {
        let level = match event.severity {
            AuditSeverity::Critical | AuditSeverity::Error => LogLevel::Error,
            AuditSeverity::Warning => LogLevel::Warn,
            AuditSeverity::Info => LogLevel::Info,
            AuditSeverity::Debug => LogLevel::Debug,
        };

        let mut entry = LogEntry::new(level, "security", format!("security event: {}", event.kind));
        if let Some(actor) = &event.actor {
            entry = entry.field("actor", actor);
        }
        for (key, value) in &event.details {
            entry = entry.field(key.as_str(), value);
        }
        entry.log();

        self.audit.record(&event);

        if let Ok(sinks) = self.sinks.read() {
            for sink in sinks.iter() {
                sink.record(&event);
            }
        }
    }
}

fn with_actor(event: SecurityEvent, actor: Option<&str>) -> SecurityEvent {
    match actor {
        Some(actor) => event.actor(actor),
        None => event,
    }
}
