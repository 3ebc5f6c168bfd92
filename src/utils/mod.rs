//! Utilities Module
//!
//! Infrastructure shared by the security checks: time, per-actor state,
//! audit trail, logging, sanitization and configuration.

pub mod audit;
pub mod clock;
pub mod crypto;
pub mod logging;
pub mod network_config;
pub mod rate_limiter;
pub mod sanitize;
pub mod security_config;
pub mod session;

pub use audit::{AuditLog, AuditSeverity, EventCounter, SecurityEvent, SecurityEventSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{is_eip55_checksum, keccak256, to_checksum_address};
pub use rate_limiter::{RateDecision, SlidingWindowLimiter};
pub use security_config::{GuardConfig, NetworkSettings, SecurityLevel, SecuritySettings};
pub use session::{Session, SessionStore};
