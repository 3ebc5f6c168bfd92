//! Endpoint Security Gate
//!
//! Boundary contract for the HTTP API and the browser controller: every
//! endpoint validates the session first, then runs its own check. Decisions
//! carry the HTTP status the caller should answer with.

use crate::error::{GuardError, GuardResult};
use crate::security::manager::SecurityManager;
use crate::types::SecurityRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Gated operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    WalletConnect,
    WalletStatus,
    TransactionPrepare,
    TransactionSign,
    NetworkSwitch,
    /// Browser navigation to `url`
    BrowserNavigate,
    /// Automated transaction confirmation click
    BrowserConfirm,
}

impl Endpoint {
    pub const ALL: [Endpoint; 7] = [
        Endpoint::WalletConnect,
        Endpoint::WalletStatus,
        Endpoint::TransactionPrepare,
        Endpoint::TransactionSign,
        Endpoint::NetworkSwitch,
        Endpoint::BrowserNavigate,
        Endpoint::BrowserConfirm,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Endpoint::WalletConnect => "wallet/connect",
            Endpoint::WalletStatus => "wallet/status",
            Endpoint::TransactionPrepare => "transaction/prepare",
            Endpoint::TransactionSign => "transaction/sign",
            Endpoint::NetworkSwitch => "network/switch",
            Endpoint::BrowserNavigate => "browser/navigate",
            Endpoint::BrowserConfirm => "browser/confirm",
        }
    }

    /// Endpoints that move funds
    pub fn is_transactional(self) -> bool {
        matches!(
            self,
            Endpoint::TransactionPrepare | Endpoint::TransactionSign | Endpoint::BrowserConfirm
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Endpoint {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s.trim().trim_start_matches('/');
        Endpoint::ALL
            .into_iter()
            .find(|e| e.path() == path)
            .ok_or_else(|| GuardError::security_violation(format!("unknown endpoint: {}", s)))
    }
}

/// Outcome of gating one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    /// HTTP status to answer with
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GuardError>,
}

impl From<GuardResult<()>> for GateDecision {
    fn from(result: GuardResult<()>) -> Self {
        match result {
            Ok(()) => Self {
                allowed: true,
                status: 200,
                error: None,
            },
            Err(e) => Self {
                allowed: false,
                status: e.http_status(),
                error: Some(e),
            },
        }
    }
}

/// Per-endpoint authorization over a shared `SecurityManager`
#[derive(Clone)]
pub struct SecurityGate {
    security: Arc<SecurityManager>,
}

impl SecurityGate {
    pub fn new(security: Arc<SecurityManager>) -> Self {
        Self { security }
    }

    pub fn security(&self) -> &Arc<SecurityManager> {
        &self.security
    }

    pub fn authorize(&self, endpoint: Endpoint, request: &SecurityRequest) -> GateDecision {
        let decision = GateDecision::from(self.check(endpoint, request));
        if !decision.allowed {
            tracing::debug!(endpoint = %endpoint, status = decision.status, "request rejected");
        }
        decision
    }

    fn check(&self, endpoint: Endpoint, request: &SecurityRequest) -> GuardResult<()> {
        let session = self.security.authenticate(&request.session_id)?;
        let actor = request.user_id.as_deref().unwrap_or(&session.actor);

        if endpoint.is_transactional() {
            self.security.check_rate_limit(actor)?;
            let tx = request
                .transaction
                .as_ref()
                .ok_or_else(|| GuardError::security_violation("transaction required"))?;
            self.security.verify_transaction_for(Some(actor), tx)?;
        }

        if matches!(endpoint, Endpoint::WalletConnect | Endpoint::BrowserNavigate) {
            if let Some(url) = &request.url {
                self.security.check_phishing(url)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::Transaction;
    use crate::utils::clock::ManualClock;
    use crate::utils::security_config::SecuritySettings;

    const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn gate() -> SecurityGate {
        let clock = Arc::new(ManualClock::starting_now());
        let security = SecurityManager::with_clock(SecuritySettings::default(), clock).unwrap();
        SecurityGate::new(Arc::new(security))
    }

    #[test]
    fn test_endpoint_paths() {
        for endpoint in Endpoint::ALL {
            assert_eq!(endpoint.path().parse::<Endpoint>().unwrap(), endpoint);
        }
        assert_eq!("/wallet/status".parse::<Endpoint>().unwrap(), Endpoint::WalletStatus);
        assert!("wallet/drain".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_missing_session_is_401() {
        let gate = gate();
        for endpoint in Endpoint::ALL {
            let decision = gate.authorize(endpoint, &SecurityRequest::new(""));
            assert!(!decision.allowed);
            assert_eq!(decision.status, 401);
        }
    }

    #[test]
    fn test_transaction_endpoints() {
        let gate = gate();
        let token = gate.security().create_session("alice").unwrap();

        let ok = SecurityRequest::new(token.as_str())
            .with_transaction(Transaction::new(CHECKSUMMED).with_value(1));
        assert!(gate.authorize(Endpoint::TransactionPrepare, &ok).allowed);

        let bad = SecurityRequest::new(token.as_str())
            .with_transaction(Transaction::new(CHECKSUMMED).with_data("0xdeadbeef"));
        let decision = gate.authorize(Endpoint::TransactionSign, &bad);
        assert_eq!(decision.status, 400);
        assert_eq!(decision.error.unwrap().code, ErrorCode::SecurityViolation);

        let missing = SecurityRequest::new(token.as_str());
        assert_eq!(gate.authorize(Endpoint::BrowserConfirm, &missing).status, 400);
    }

    #[test]
    fn test_transaction_events_name_the_actor() {
        let gate = gate();
        let token = gate.security().create_session("alice").unwrap();

        let request = SecurityRequest::new(token.as_str())
            .with_transaction(Transaction::new(CHECKSUMMED).with_value(1));
        assert!(gate.authorize(Endpoint::TransactionSign, &request).allowed);

        let rejected = SecurityRequest::new(token.as_str())
            .for_user("bob")
            .with_transaction(Transaction::new(CHECKSUMMED).with_data("0xdeadbeef"));
        assert!(!gate.authorize(Endpoint::TransactionSign, &rejected).allowed);

        let audit = gate.security().audit_log();
        let alice = audit.query_by_actor("alice");
        assert!(alice.iter().any(|e| e.kind == "transaction_verified"));
        let bob = audit.query_by_actor("bob");
        assert!(bob.iter().any(|e| e.kind == "transaction_violation"));
    }

    #[test]
    fn test_navigation_checks_phishing() {
        let gate = gate();
        let token = gate.security().create_session("alice").unwrap();

        let request = SecurityRequest::new(token.as_str()).with_url("https://metamask-security-update.tk");
        let decision = gate.authorize(Endpoint::BrowserNavigate, &request);
        assert_eq!(decision.status, 400);
        assert_eq!(decision.error.unwrap().code, ErrorCode::PhishingDetected);

        // Status endpoint ignores the URL
        assert!(gate.authorize(Endpoint::WalletStatus, &request).allowed);

        let request = SecurityRequest::new(token.as_str()).with_url("https://app.uniswap.org");
        assert!(gate.authorize(Endpoint::WalletConnect, &request).allowed);
    }

    #[test]
    fn test_rate_limited_is_429() {
        let gate = gate();
        let token = gate.security().create_session("alice").unwrap();
        let request = SecurityRequest::new(token.as_str())
            .with_transaction(Transaction::new(CHECKSUMMED).with_value(1));

        for _ in 0..10 {
            assert!(gate.authorize(Endpoint::TransactionPrepare, &request).allowed);
        }
        assert_eq!(gate.authorize(Endpoint::TransactionPrepare, &request).status, 429);
    }
}
