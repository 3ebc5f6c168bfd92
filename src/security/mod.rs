//! Security Module
//!
//! Security checks for wallet operations:
//! - Transaction validation (address, value, gas, payload)
//! - Suspicious activity and failed-attempt lockout
//! - Signature replay protection
//! - Phishing and scam detection
//! - The `SecurityManager` façade and endpoint gate
//! - RPC endpoint trust and network switching

pub mod gate;
pub mod manager;
pub mod network;
pub mod phishing;
pub mod threat_detection;
pub mod transaction;
pub mod verification;

pub use gate::*;
pub use manager::*;
pub use network::*;
pub use phishing::*;
pub use threat_detection::*;
pub use transaction::*;
pub use verification::*;
