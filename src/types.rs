//! Shared types for the security core
//!
//! Wire-level shapes that arrive from the HTTP layer or the browser controller.
//! None of these are persisted; they are validated transiently per call.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

// =============================================================================
// Quantity
// =============================================================================

/// A numeric transaction field as it arrives over the wire.
///
/// Clients send amounts as JSON integers, decimal strings or `0x` hex strings.
/// Bare JSON numbers are read from their exact digits, so amounts above
/// `u64::MAX` keep every wei. Fractional or exponent forms stay text and fail
/// validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Quantity {
    Int(i128),
    Text(String),
}

impl Quantity {
    /// Parse as a signed integer (`None` if the field is not an integer)
    pub fn to_i128(&self) -> Option<i128> {
        match self {
            Quantity::Int(v) => Some(*v),
            Quantity::Text(s) => parse_int_str(s),
        }
    }
}

/// Parse a decimal or `0x`-prefixed hex integer string
pub fn parse_int_str(input: &str) -> Option<i128> {
    let trimmed = input.trim();
    if let Some(hex_part) = trimmed.strip_prefix("0x") {
        if hex_part.is_empty() || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        return i128::from_str_radix(hex_part, 16).ok();
    }
    trimmed.parse::<i128>().ok()
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quantity::Int(v) => write!(f, "{}", v),
            Quantity::Text(s) => write!(f, "{}", s),
        }
    }
}

macro_rules! quantity_from_small_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Quantity {
            fn from(v: $t) -> Self {
                Quantity::Int(v as i128)
            }
        })*
    };
}

quantity_from_small_int!(i32, u32, i64, u64, i128);

impl From<u128> for Quantity {
    fn from(v: u128) -> Self {
        match i128::try_from(v) {
            Ok(i) => Quantity::Int(i),
            Err(_) => Quantity::Text(v.to_string()),
        }
    }
}

impl From<&str> for Quantity {
    fn from(s: &str) -> Self {
        Quantity::Text(s.to_string())
    }
}

impl From<String> for Quantity {
    fn from(s: String) -> Self {
        Quantity::Text(s)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Quantity::Int(v) => match i64::try_from(*v) {
                Ok(small) => serializer.serialize_i64(small),
                // Out of i64 range: strings keep the value exact
                Err(_) => serializer.serialize_str(&v.to_string()),
            },
            Quantity::Text(s) => serializer.serialize_str(s),
        }
    }
}

const MAX_EXACT_F64: f64 = 9_007_199_254_740_992.0;

const SERDE_JSON_NUMBER_TOKEN: &str = "$serde_json::private::Number";

struct QuantityVisitor;

impl<'de> Visitor<'de> for QuantityVisitor {
    type Value = Quantity;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an integer, a decimal string or a 0x-prefixed hex string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
        Ok(Quantity::Int(v as i128))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
        Ok(Quantity::Int(v as i128))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<Quantity, E> {
        Ok(Quantity::Int(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Quantity, E> {
        Ok(Quantity::from(v))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Quantity, E> {
        // Only floats below 2^53 are exact. Anything else stays text so
        // validation reports it instead of comparing a rounded amount.
        if v.is_finite() && v.fract() == 0.0 && v.abs() < MAX_EXACT_F64 {
            Ok(Quantity::Int(v as i128))
        } else {
            Ok(Quantity::Text(format!("{:e}", v)))
        }
    }

    /// `serde_json` numbers arrive as a one-entry map holding the exact digits
    fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<Quantity, A::Error> {
        let key: Option<String> = map.next_key()?;
        if key.as_deref() != Some(SERDE_JSON_NUMBER_TOKEN) {
            return Err(de::Error::invalid_type(de::Unexpected::Map, &self));
        }
        let digits: String = map.next_value()?;
        Ok(match parse_int_str(&digits) {
            Some(v) => Quantity::Int(v),
            None => Quantity::Text(digits),
        })
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
        Ok(Quantity::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Quantity, E> {
        Ok(Quantity::Text(v))
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(QuantityVisitor)
    }
}

// =============================================================================
// Transactions
// =============================================================================

fn default_data() -> String {
    "0x".to_string()
}

/// Transaction submitted for validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Recipient address
    #[serde(default)]
    pub to: String,
    /// Amount in wei
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Quantity>,
    /// Gas price in wei
    #[serde(rename = "gasPrice", default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<Quantity>,
    /// Gas limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<Quantity>,
    /// Call data as hex
    #[serde(default = "default_data")]
    pub data: String,
}

impl Transaction {
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            value: None,
            gas_price: None,
            gas: None,
            data: default_data(),
        }
    }

    pub fn with_value(mut self, value: impl Into<Quantity>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_gas_price(mut self, gas_price: impl Into<Quantity>) -> Self {
        self.gas_price = Some(gas_price.into());
        self
    }

    pub fn with_gas(mut self, gas: impl Into<Quantity>) -> Self {
        self.gas = Some(gas.into());
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }
}

/// Historical transaction record used for activity pattern analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Quantity>,
    /// Unix timestamp in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl TxRecord {
    pub fn new(value: impl Into<Quantity>, timestamp: f64) -> Self {
        Self {
            to: None,
            value: Some(value.into()),
            timestamp: Some(timestamp),
        }
    }

    pub fn at(timestamp: f64) -> Self {
        Self {
            to: None,
            value: None,
            timestamp: Some(timestamp),
        }
    }
}

/// Either a single record or a list, as accepted by the activity check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TransactionBatch {
    Many(Vec<TxRecord>),
    Single(TxRecord),
}

impl TransactionBatch {
    pub fn as_slice(&self) -> &[TxRecord] {
        match self {
            TransactionBatch::Many(records) => records,
            TransactionBatch::Single(record) => std::slice::from_ref(record),
        }
    }
}

// Hand-written so records are read straight from the input. An untagged
// derive buffers the input first, and buffered `serde_json` numbers no longer
// deserialize as `f64` timestamps.
impl<'de> Deserialize<'de> for TransactionBatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(BatchVisitor)
    }
}

struct BatchVisitor;

impl<'de> Visitor<'de> for BatchVisitor {
    type Value = TransactionBatch;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a transaction record or a list of records")
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, seq: A) -> Result<TransactionBatch, A::Error> {
        Vec::<TxRecord>::deserialize(de::value::SeqAccessDeserializer::new(seq))
            .map(TransactionBatch::Many)
    }

    fn visit_map<A: de::MapAccess<'de>>(self, map: A) -> Result<TransactionBatch, A::Error> {
        TxRecord::deserialize(de::value::MapAccessDeserializer::new(map))
            .map(TransactionBatch::Single)
    }
}

impl From<TxRecord> for TransactionBatch {
    fn from(record: TxRecord) -> Self {
        TransactionBatch::Single(record)
    }
}

impl From<Vec<TxRecord>> for TransactionBatch {
    fn from(records: Vec<TxRecord>) -> Self {
        TransactionBatch::Many(records)
    }
}

// =============================================================================
// Networks and requests
// =============================================================================

/// RPC network the wallet may switch to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedNetwork {
    pub id: String,
    pub name: String,
    pub rpc_url: String,
    pub chain_id: u64,
}

impl TrustedNetwork {
    pub fn new(id: &str, name: &str, rpc_url: &str, chain_id: u64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            rpc_url: rpc_url.to_string(),
            chain_id,
        }
    }
}

/// Inbound request passed through the full check chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityRequest {
    /// Session token issued by `create_session`
    #[serde(default)]
    pub session_id: String,
    /// Actor the rate limit applies to; defaults to the session owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl SecurityRequest {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_transaction(mut self, tx: Transaction) -> Self {
        self.transaction = Some(tx);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

// =============================================================================
// Response envelope
// =============================================================================

/// Standard response wrapper for callers at the boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<crate::error::GuardError>,
    pub http_status: u16,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            http_status: 200,
        }
    }

    pub fn err(error: crate::error::GuardError) -> Self {
        Self {
            success: false,
            data: None,
            http_status: error.http_status(),
            error: Some(error),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":{"code":"internal","message":"Serialization failed"},"http_status":500}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_envelope() {
        let ok = ApiResponse::ok(true).to_json();
        assert_eq!(ok, r#"{"success":true,"data":true,"error":null,"http_status":200}"#);

        let err: ApiResponse<()> =
            ApiResponse::err(crate::error::GuardError::invalid_session("Session not found"));
        let json: serde_json::Value = serde_json::from_str(&err.to_json()).unwrap();
        assert_eq!(json["http_status"], 401);
        assert_eq!(json["error"]["code"], "invalid_session");
    }

    #[test]
    fn test_quantity_parsing() {
        assert_eq!(Quantity::from("1000").to_i128(), Some(1000));
        assert_eq!(Quantity::from("0x3b9aca00").to_i128(), Some(1_000_000_000));
        assert_eq!(Quantity::from("-5").to_i128(), Some(-5));
        assert_eq!(Quantity::from("0x").to_i128(), None);
        assert_eq!(Quantity::from("0x-1").to_i128(), None);
        assert_eq!(Quantity::from("ten").to_i128(), None);
    }

    #[test]
    fn test_transaction_wire_names() {
        let json = r#"{
            "to": "0x742d35Cc6634C0532925a3b844Bc454e4438f44e",
            "value": "1000000000000000000",
            "gasPrice": "0x4a817c800",
            "gas": 21000
        }"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.data, "0x");
        assert_eq!(tx.value.unwrap().to_i128(), Some(1_000_000_000_000_000_000));
        assert_eq!(tx.gas_price.unwrap().to_i128(), Some(20_000_000_000));
        assert_eq!(tx.gas, Some(Quantity::Int(21000)));
    }

    #[test]
    fn test_large_json_number_value_is_exact() {
        let tx: Transaction =
            serde_json::from_str(r#"{"to": "0x0", "value": 100000000000000001000}"#).unwrap();
        assert_eq!(tx.value.unwrap().to_i128(), Some(100_000_000_000_000_001_000));

        let tx: Transaction =
            serde_json::from_str(r#"{"to": "0x0", "value": 1.5e20, "gasPrice": 2.5}"#).unwrap();
        assert_eq!(tx.value.unwrap().to_i128(), None);
        assert_eq!(tx.gas_price.unwrap().to_i128(), None);
    }

    #[test]
    fn test_object_is_not_a_quantity() {
        assert!(serde_json::from_str::<Quantity>(r#"{"digits": "5"}"#).is_err());
    }

    #[test]
    fn test_batch_keeps_exact_values_and_timestamps() {
        let batch: TransactionBatch = serde_json::from_str(
            r#"[{"value": 100000000000000001000, "timestamp": 1700000000.25}]"#,
        )
        .unwrap();
        let record = &batch.as_slice()[0];
        assert_eq!(
            record.value.as_ref().unwrap().to_i128(),
            Some(100_000_000_000_000_001_000)
        );
        assert_eq!(record.timestamp, Some(1_700_000_000.25));
    }

    #[test]
    fn test_batch_single_or_many() {
        let single: TransactionBatch =
            serde_json::from_str(r#"{"value": 5, "timestamp": 1700000000.5}"#).unwrap();
        assert_eq!(single.as_slice().len(), 1);

        let many: TransactionBatch =
            serde_json::from_str(r#"[{"value": 5}, {"value": "6", "timestamp": 1}]"#).unwrap();
        assert_eq!(many.as_slice().len(), 2);
    }

    #[test]
    fn test_quantity_serializes_large_values_as_strings() {
        let json = serde_json::to_string(&Quantity::from(100_000_000_000_000_000_000u128)).unwrap();
        assert_eq!(json, "\"100000000000000000000\"");
        assert_eq!(serde_json::to_string(&Quantity::from(7u64)).unwrap(), "7");
    }
}
