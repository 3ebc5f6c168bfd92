//! Unified error types for the security core
//!
//! Every check returns a `GuardResult`. The error carries a typed `ErrorCode`
//! that callers at the boundary (HTTP layer, browser automation) translate
//! into their own responses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all security-core operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl GuardError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn security_violation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SecurityViolation, msg)
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimitExceeded, msg)
    }

    pub fn phishing(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::PhishingDetected, msg)
    }

    pub fn invalid_session(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSession, msg)
    }

    pub fn suspicious_activity(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SuspiciousActivity, msg)
    }

    pub fn rpc_validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcValidation, msg)
    }

    pub fn network_switch(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkSwitch, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    /// HTTP status an API layer should answer with for this error
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl fmt::Display for GuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for GuardError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or out-of-bounds transaction, malicious payload, bad checksum
    SecurityViolation,
    /// Actor exceeded the sliding-window cap
    RateLimitExceeded,
    /// URL matched a phishing heuristic
    PhishingDetected,
    /// Missing, unknown or expired session token
    InvalidSession,
    /// Failed-attempt lockout or transaction-pattern anomaly
    SuspiciousActivity,
    /// RPC endpoint is untrusted or failed TLS verification
    RpcValidation,
    /// Network switch rejected
    NetworkSwitch,
    /// Invalid configuration
    Config,
    Internal,
}

impl ErrorCode {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::InvalidSession => 401,
            ErrorCode::SecurityViolation
            | ErrorCode::PhishingDetected
            | ErrorCode::RpcValidation
            | ErrorCode::NetworkSwitch => 400,
            ErrorCode::SuspiciousActivity => 403,
            ErrorCode::RateLimitExceeded => 429,
            ErrorCode::Config | ErrorCode::Internal => 500,
        }
    }
}

/// Result type alias for security-core operations
pub type GuardResult<T> = Result<T, GuardError>;

// Conversions from common error types

impl From<serde_json::Error> for GuardError {
    fn from(e: serde_json::Error) -> Self {
        GuardError::security_violation("malformed request payload").with_details(e.to_string())
    }
}

impl From<std::io::Error> for GuardError {
    fn from(e: std::io::Error) -> Self {
        GuardError::internal(e.to_string())
    }
}

impl From<url::ParseError> for GuardError {
    fn from(e: url::ParseError) -> Self {
        GuardError::security_violation(format!("invalid URL: {}", e))
    }
}

impl From<regex::Error> for GuardError {
    fn from(e: regex::Error) -> Self {
        GuardError::internal(format!("pattern compilation failed: {}", e))
    }
}

impl From<rustls::Error> for GuardError {
    fn from(e: rustls::Error) -> Self {
        GuardError::rpc_validation(format!("TLS error: {}", e))
    }
}

impl From<tokio::time::error::Elapsed> for GuardError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        GuardError::rpc_validation("TLS handshake timed out")
    }
}
