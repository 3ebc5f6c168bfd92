//! Transaction Validation
//!
//! Fail-fast checks on a transaction before it is prepared or signed:
//! 1. Recipient address format and checksum casing
//! 2. Value bounds
//! 3. Gas price bounds
//! 4. Malicious call-data heuristic
//!
//! The first violated rule is reported; later rules are not evaluated.

use crate::error::{GuardError, GuardResult};
use crate::types::{Quantity, Transaction};
use crate::utils::crypto::{is_eip55_checksum, is_mixed_case};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call-data marker treated as a malicious payload
const MALICIOUS_PAYLOAD_MARKER: &str = "deadbeef";

/// Empty call data
const EMPTY_DATA: &str = "0x";

/// Bounds applied by the validator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionLimits {
    /// Maximum value in wei
    pub max_transaction_value: u128,
    /// Maximum gas price in wei
    pub max_gas_price: u128,
    /// Mixed-case addresses must match their EIP-55 checksum
    pub enforce_eip55: bool,
}

impl Default for TransactionLimits {
    fn default() -> Self {
        Self {
            max_transaction_value: 100_000_000_000_000_000_000,
            max_gas_price: 500_000_000_000,
            enforce_eip55: false,
        }
    }
}

/// Rule a transaction broke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxViolation {
    InvalidAddressFormat,
    /// All-lower or all-upper address with a non-zero value
    UnchecksummedAddress,
    /// Mixed case, but not the EIP-55 casing
    BadChecksum,
    InvalidValue,
    NegativeValue,
    ValueTooHigh,
    InvalidGasPrice,
    GasPriceTooHigh,
    MaliciousPayload,
}

impl TxViolation {
    pub fn message(self) -> &'static str {
        match self {
            TxViolation::InvalidAddressFormat => "invalid address format",
            TxViolation::UnchecksummedAddress => "address checksum validation failed",
            TxViolation::BadChecksum => "invalid address checksum",
            TxViolation::InvalidValue => "invalid transaction value",
            TxViolation::NegativeValue => "negative transaction value",
            TxViolation::ValueTooHigh => "transaction value exceeds maximum",
            TxViolation::InvalidGasPrice => "invalid gas price format",
            TxViolation::GasPriceTooHigh => "gas price exceeds maximum",
            TxViolation::MaliciousPayload => "malicious payload detected",
        }
    }
}

impl fmt::Display for TxViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl From<TxViolation> for GuardError {
    fn from(v: TxViolation) -> Self {
        GuardError::security_violation(v.message())
    }
}

/// Stateless transaction validator
#[derive(Debug, Clone, Default)]
pub struct TransactionValidator {
    limits: TransactionLimits,
}

impl TransactionValidator {
    pub fn new(limits: TransactionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &TransactionLimits {
        &self.limits
    }

    /// Validate, returning the first rule the transaction breaks
    pub fn validate(&self, tx: &Transaction) -> GuardResult<()> {
        self.check(tx).map_err(|violation| {
            let err = GuardError::from(violation);
            match violation {
                TxViolation::ValueTooHigh => err.with_details(format!(
                    "maximum is {} wei",
                    self.limits.max_transaction_value
                )),
                TxViolation::GasPriceTooHigh => {
                    err.with_details(format!("maximum is {} wei", self.limits.max_gas_price))
                }
                _ => err,
            }
        })
    }

    /// Same rules as `validate`, typed
    pub fn check(&self, tx: &Transaction) -> Result<(), TxViolation> {
        let value = parse_quantity(tx.value.as_ref());

        self.check_address(&tx.to, value)?;
        self.check_value(value)?;
        self.check_gas_price(tx.gas_price.as_ref())?;
        check_payload(&tx.data)
    }

    fn check_address(&self, address: &str, value: Option<i128>) -> Result<(), TxViolation> {
        if !is_well_formed_address(address) {
            return Err(TxViolation::InvalidAddressFormat);
        }

        if !is_mixed_case(address) {
            // Zero-value calls to unchecksummed (contract) addresses are allowed
            if value == Some(0) {
                return Ok(());
            }
            return Err(TxViolation::UnchecksummedAddress);
        }

        if self.limits.enforce_eip55 && !is_eip55_checksum(address) {
            return Err(TxViolation::BadChecksum);
        }
        Ok(())
    }

    fn check_value(&self, value: Option<i128>) -> Result<(), TxViolation> {
        let value = value.ok_or(TxViolation::InvalidValue)?;
        if value < 0 {
            return Err(TxViolation::NegativeValue);
        }
        if value as u128 > self.limits.max_transaction_value {
            return Err(TxViolation::ValueTooHigh);
        }
        Ok(())
    }

    fn check_gas_price(&self, gas_price: Option<&Quantity>) -> Result<(), TxViolation> {
        let gas_price = parse_quantity(gas_price)
            .filter(|g| *g >= 0)
            .ok_or(TxViolation::InvalidGasPrice)?;
        if gas_price as u128 > self.limits.max_gas_price {
            return Err(TxViolation::GasPriceTooHigh);
        }
        Ok(())
    }
}

/// Missing quantities are zero; unparsable ones are `None`
fn parse_quantity(quantity: Option<&Quantity>) -> Option<i128> {
    match quantity {
        None => Some(0),
        Some(q) => q.to_i128(),
    }
}

/// Exactly `0x` followed by 40 hex digits
pub fn is_well_formed_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn check_payload(data: &str) -> Result<(), TxViolation> {
    if data != EMPTY_DATA && data.to_ascii_lowercase().contains(MALICIOUS_PAYLOAD_MARKER) {
        return Err(TxViolation::MaliciousPayload);
    }
    Ok(())
}
