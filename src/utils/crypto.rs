//! Address Checksum Utilities
//!
//! Keccak-256 and EIP-55 helpers used by transaction validation.

use tiny_keccak::{Hasher, Keccak};

/// Keccak256 hash (used for Ethereum addresses)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Convert raw address bytes to checksummed Ethereum address
pub fn to_checksum_address(address: &[u8]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut result = String::from("0x");
    for (i, ch) in lower.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };

        if ch.is_ascii_digit() {
            result.push(ch);
        } else if nibble >= 8 {
            result.push(ch.to_ascii_uppercase());
        } else {
            result.push(ch);
        }
    }

    result
}

/// True if `address` (0x + 40 hex) carries a correct EIP-55 checksum
pub fn is_eip55_checksum(address: &str) -> bool {
    let Some(hex_part) = address.strip_prefix("0x") else { return false };
    let Ok(bytes) = hex::decode(hex_part.to_ascii_lowercase()) else { return false };
    if bytes.len() != 20 {
        return false;
    }
    to_checksum_address(&bytes) == address
}

/// True if the address has both upper- and lower-case hex letters
pub fn is_mixed_case(address: &str) -> bool {
    let digits = address.strip_prefix("0x").unwrap_or(address);
    digits != digits.to_ascii_lowercase() && digits != digits.to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256() {
        let hash = keccak256(b"");
        assert_eq!(
            hex::encode(hash),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_checksum_address() {
        let addr_bytes = hex::decode("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(
            to_checksum_address(&addr_bytes),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn test_eip55_validation() {
        assert!(is_eip55_checksum("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        // One flipped letter
        assert!(!is_eip55_checksum("0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(!is_eip55_checksum("5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
    }

    #[test]
    fn test_mixed_case() {
        assert!(is_mixed_case("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"));
        assert!(!is_mixed_case("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"));
        assert!(!is_mixed_case("0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED"));
        assert!(!is_mixed_case("0x1234567890123456789012345678901234567890"));
    }
}
