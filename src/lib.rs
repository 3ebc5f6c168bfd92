//! Wallet Guard
//!
//! Security validation core for a browser-wallet integration service.
//!
//! # Architecture
//!
//! This crate provides:
//! - **security**: transaction validation, phishing detection, suspicious
//!   activity, signature replay protection, the `SecurityManager` façade,
//!   the endpoint gate and RPC network management
//! - **utils**: sessions, sliding-window rate limiting, audit log, logging,
//!   input sanitization and typed configuration
//!
//! # Concurrency
//!
//! Construct one `SecurityManager` at startup and share it as
//! `Arc<SecurityManager>`. All checks take `&self` and are safe to call
//! concurrently; per-actor state is sharded so different actors do not contend
//! on one lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use wallet_guard::{SecurityManager, SecurityRequest, SecuritySettings, Transaction};
//!
//! let security = Arc::new(SecurityManager::new(SecuritySettings::default())?);
//! let token = security.create_session("alice")?;
//!
//! let request = SecurityRequest::new(token)
//!     .with_transaction(Transaction::new("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").with_value(1))
//!     .with_url("https://app.uniswap.org");
//! security.comprehensive_security_check(&request)?;
//! ```

pub mod error;
pub mod security;
pub mod types;
pub mod utils;

// Re-export key types for convenience
pub use error::{ErrorCode, GuardError, GuardResult};
pub use types::*;

pub use security::{
    Endpoint, GateDecision, HealthMonitor, NetworkManager, PhishingDetector, RustlsProbe,
    SecurityGate, SecurityManager, SignatureReplayCache, SignatureVerdict,
    SuspiciousActivityDetector, TlsProbe, TransactionValidator,
};
pub use utils::{
    AuditLog, AuditSeverity, Clock, EventCounter, GuardConfig, ManualClock, NetworkSettings,
    SecurityEvent, SecurityEventSink, SecurityLevel, SecuritySettings, SystemClock,
};

pub use utils::crypto::{keccak256, to_checksum_address};
