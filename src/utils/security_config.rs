//! Security Configuration
//!
//! Typed configuration for the security core:
//! - Security level presets (standard, high, paranoid)
//! - Validation of security settings
//! - TOML loading for the `[security]`, `[network]` and `[logging]` sections

use crate::error::{GuardError, GuardResult};
use crate::utils::logging::LogFormat;
use crate::utils::network_config::DEFAULT_TRUSTED_RPC_URLS;
use crate::utils::sanitize::validate_https_url;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const ETHER: u128 = 1_000_000_000_000_000_000;
const GWEI: u128 = 1_000_000_000;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl From<ConfigError> for GuardError {
    fn from(e: ConfigError) -> Self {
        GuardError::config(e.to_string())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

/// Security level presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    /// Standard security - suitable for most users
    #[default]
    Standard,
    /// High security - for users with significant holdings
    High,
    /// Paranoid - maximum security, some convenience trade-offs
    Paranoid,
    /// Custom - user-defined settings
    Custom,
}

/// Security settings
///
/// When loaded from a file, `level` selects the preset and any explicit key
/// overrides that preset's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SecuritySettingsFile")]
pub struct SecuritySettings {
    pub level: SecurityLevel,

    // Rate limiting
    /// Sensitive operations allowed per actor per `rate_window`
    pub max_transaction_rate: u32,
    #[serde(rename = "rate_window_secs", with = "duration_secs")]
    pub rate_window: Duration,

    // Sessions
    /// Inactivity timeout
    #[serde(rename = "session_timeout_secs", with = "duration_secs")]
    pub session_timeout: Duration,

    // Lockout
    pub max_failed_attempts: u32,

    // Phishing
    pub phishing_check_enabled: bool,

    // Transaction bounds (wei)
    #[serde(with = "wei_amount")]
    pub max_transaction_value: u128,
    #[serde(with = "wei_amount")]
    pub max_gas_price: u128,
    /// Require mixed-case addresses to match their EIP-55 checksum
    pub enforce_eip55: bool,

    // Activity analysis
    #[serde(rename = "activity_window_secs", with = "duration_secs")]
    pub activity_window: Duration,

    // Eviction (None keeps entries for the process lifetime)
    #[serde(rename = "signature_cache_ttl_secs", with = "option_duration_secs")]
    pub signature_cache_ttl: Option<Duration>,
    #[serde(rename = "idle_actor_ttl_secs", with = "option_duration_secs")]
    pub idle_actor_ttl: Option<Duration>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self::standard()
    }
}

impl SecuritySettings {
    /// Standard security preset
    pub fn standard() -> Self {
        Self {
            level: SecurityLevel::Standard,
            max_transaction_rate: 10,
            rate_window: Duration::from_secs(60),
            session_timeout: Duration::from_secs(60 * 60), // 1 hour
            max_failed_attempts: 3,
            phishing_check_enabled: true,
            max_transaction_value: 100 * ETHER,
            max_gas_price: 500 * GWEI,
            enforce_eip55: false,
            activity_window: Duration::from_secs(60),
            signature_cache_ttl: None,
            idle_actor_ttl: None,
        }
    }

    /// High security preset
    pub fn high() -> Self {
        Self {
            level: SecurityLevel::High,
            max_transaction_rate: 5,
            session_timeout: Duration::from_secs(15 * 60), // 15 minutes
            max_transaction_value: 10 * ETHER,
            max_gas_price: 300 * GWEI,
            enforce_eip55: true,
            signature_cache_ttl: Some(Duration::from_secs(7 * 24 * 60 * 60)),
            idle_actor_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            ..Self::standard()
        }
    }

    /// Paranoid security preset
    pub fn paranoid() -> Self {
        Self {
            level: SecurityLevel::Paranoid,
            max_transaction_rate: 3,
            session_timeout: Duration::from_secs(5 * 60), // 5 minutes
            max_failed_attempts: 2,
            max_transaction_value: ETHER,
            max_gas_price: 200 * GWEI,
            enforce_eip55: true,
            // Replay cache is never evicted
            signature_cache_ttl: None,
            idle_actor_ttl: Some(Duration::from_secs(24 * 60 * 60)),
            ..Self::standard()
        }
    }

    pub fn for_level(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::Standard | SecurityLevel::Custom => Self::standard(),
            SecurityLevel::High => Self::high(),
            SecurityLevel::Paranoid => Self::paranoid(),
        }
    }

    /// Reject settings the core cannot run with
    pub fn validate(&self) -> GuardResult<()> {
        self.check().map_err(GuardError::from)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.max_transaction_rate == 0 {
            return Err(invalid("max_transaction_rate", "must be at least 1"));
        }
        if self.rate_window.is_zero() {
            return Err(invalid("rate_window_secs", "must be positive"));
        }
        if self.session_timeout.is_zero() {
            return Err(invalid("session_timeout_secs", "must be positive"));
        }
        if self.max_failed_attempts == 0 {
            return Err(invalid("max_failed_attempts", "must be at least 1"));
        }
        if self.activity_window.is_zero() {
            return Err(invalid("activity_window_secs", "must be positive"));
        }
        if self.max_transaction_value > i128::MAX as u128 || self.max_gas_price > i128::MAX as u128 {
            return Err(invalid("max_transaction_value", "out of range"));
        }
        if matches!(self.signature_cache_ttl, Some(ttl) if ttl.is_zero()) {
            return Err(invalid("signature_cache_ttl_secs", "must be positive when set"));
        }
        if matches!(self.idle_actor_ttl, Some(ttl) if ttl.is_zero()) {
            return Err(invalid("idle_actor_ttl_secs", "must be positive when set"));
        }
        Ok(())
    }

    /// Legal but weak combinations
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if !self.phishing_check_enabled {
            warnings.push("Warning: Phishing checks are disabled".to_string());
        }

        if self.session_timeout > Duration::from_secs(24 * 60 * 60) {
            warnings.push("Warning: Session timeout exceeds 24 hours".to_string());
        }

        if self.max_failed_attempts > 10 {
            warnings.push("Warning: Failed-attempt lockout threshold is very high".to_string());
        }

        if self.signature_cache_ttl.is_some_and(|ttl| ttl < self.session_timeout) {
            warnings.push(
                "Warning: Signature cache TTL is shorter than the session timeout".to_string(),
            );
        }

        warnings
    }
}

/// `[network]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Exact-match RPC whitelist
    pub trusted_rpc_urls: Vec<String>,
    #[serde(rename = "tls_timeout_secs", with = "duration_secs")]
    pub tls_timeout: Duration,
    #[serde(rename = "health_interval_secs", with = "duration_secs")]
    pub health_interval: Duration,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            trusted_rpc_urls: DEFAULT_TRUSTED_RPC_URLS.iter().map(|u| u.to_string()).collect(),
            tls_timeout: Duration::from_secs(5),
            health_interval: Duration::from_secs(30),
        }
    }
}

impl NetworkSettings {
    pub fn validate(&self) -> GuardResult<()> {
        self.check().map_err(GuardError::from)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.tls_timeout.is_zero() {
            return Err(invalid("tls_timeout_secs", "must be positive"));
        }
        if self.health_interval.is_zero() {
            return Err(invalid("health_interval_secs", "must be positive"));
        }
        for url in &self.trusted_rpc_urls {
            validate_https_url(url)
                .map_err(|e| invalid("trusted_rpc_urls", format!("{}: {}", url, e.message)))?;
        }
        Ok(())
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Complete file-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub security: SecuritySettings,
    pub network: NetworkSettings,
    pub logging: LoggingSettings,
}

impl GuardConfig {
    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GuardConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.check()?;
        Ok(config)
    }

    pub fn validate(&self) -> GuardResult<()> {
        self.check().map_err(GuardError::from)
    }

    fn check(&self) -> Result<(), ConfigError> {
        self.security.check()?;
        self.network.check()
    }
}

/// `[security]` as written in a config file
#[derive(Deserialize)]
struct SecuritySettingsFile {
    #[serde(default)]
    level: SecurityLevel,
    max_transaction_rate: Option<u32>,
    #[serde(default, rename = "rate_window_secs", deserialize_with = "some_secs")]
    rate_window: Option<Duration>,
    #[serde(default, rename = "session_timeout_secs", deserialize_with = "some_secs")]
    session_timeout: Option<Duration>,
    max_failed_attempts: Option<u32>,
    phishing_check_enabled: Option<bool>,
    #[serde(default, deserialize_with = "some_wei")]
    max_transaction_value: Option<u128>,
    #[serde(default, deserialize_with = "some_wei")]
    max_gas_price: Option<u128>,
    enforce_eip55: Option<bool>,
    #[serde(default, rename = "activity_window_secs", deserialize_with = "some_secs")]
    activity_window: Option<Duration>,
    #[serde(default, rename = "signature_cache_ttl_secs", deserialize_with = "some_secs")]
    signature_cache_ttl: Option<Duration>,
    #[serde(default, rename = "idle_actor_ttl_secs", deserialize_with = "some_secs")]
    idle_actor_ttl: Option<Duration>,
}

impl From<SecuritySettingsFile> for SecuritySettings {
    fn from(file: SecuritySettingsFile) -> Self {
        let preset = SecuritySettings::for_level(file.level);
        Self {
            level: file.level,
            max_transaction_rate: file.max_transaction_rate.unwrap_or(preset.max_transaction_rate),
            rate_window: file.rate_window.unwrap_or(preset.rate_window),
            session_timeout: file.session_timeout.unwrap_or(preset.session_timeout),
            max_failed_attempts: file.max_failed_attempts.unwrap_or(preset.max_failed_attempts),
            phishing_check_enabled: file
                .phishing_check_enabled
                .unwrap_or(preset.phishing_check_enabled),
            max_transaction_value: file
                .max_transaction_value
                .unwrap_or(preset.max_transaction_value),
            max_gas_price: file.max_gas_price.unwrap_or(preset.max_gas_price),
            enforce_eip55: file.enforce_eip55.unwrap_or(preset.enforce_eip55),
            activity_window: file.activity_window.unwrap_or(preset.activity_window),
            // TOML has no null, so an absent TTL keeps the preset's choice
            signature_cache_ttl: file.signature_cache_ttl.or(preset.signature_cache_ttl),
            idle_actor_ttl: file.idle_actor_ttl.or(preset.idle_actor_ttl),
        }
    }
}

fn some_secs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    duration_secs::deserialize(deserializer).map(Some)
}

fn some_wei<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u128>, D::Error> {
    wei_amount::deserialize(deserializer).map(Some)
}

/// Durations as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod option_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|v| v.map(Duration::from_secs))
    }
}

/// Wei amounts as integers or decimal / `0x` strings; serialized as strings
mod wei_amount {
    use crate::types::Quantity;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let quantity = Quantity::deserialize(deserializer)?;
        match quantity.to_i128() {
            Some(v) if v >= 0 => Ok(v as u128),
            _ => Err(de::Error::custom(format!("invalid wei amount '{}'", quantity))),
        }
    }
}
