//! Account address parsing and derivation.

use secp256k1::PublicKey;
use sha3::{Digest, Keccak256};

/// Length of an address payload in bytes.
const ADDRESS_BYTES: usize = 20;

/// Check that `address` is `0x` followed by 40 hex digits (any case).
pub fn is_valid_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(hex_part) => {
            hex_part.len() == ADDRESS_BYTES * 2 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// Canonical form used for storage and comparison.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Derive the lower-case `0x` address of a public key: the low-order
/// 20 bytes of `keccak256(uncompressed_key[1..])`.
pub fn address_from_public_key(public_key: &PublicKey) -> String {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    format!("0x{}", hex::encode(&hash[hash.len() - ADDRESS_BYTES..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{Secp256k1, SecretKey};

    #[test]
    fn test_valid_addresses() {
        assert!(is_valid_address("0xFf893698faC953dBbCdC3276e8aD13ed3267fB06"));
        assert!(is_valid_address("0x0f28f51f0cea481a5e52c00f88109ebb4f793009"));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(!is_valid_address("invalidAddress"));
        assert!(!is_valid_address(""));
        assert!(!is_valid_address("0x"));
        // Missing prefix
        assert!(!is_valid_address("0f28f51f0cea481a5e52c00f88109ebb4f793009"));
        // 39 digits
        assert!(!is_valid_address("0x0f28f51f0cea481a5e52c00f88109ebb4f79300"));
        // Non-hex
        assert!(!is_valid_address("0xzf28f51f0cea481a5e52c00f88109ebb4f793009"));
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(
            normalize_address(" 0xFf893698faC953dBbCdC3276e8aD13ed3267fB06 "),
            "0xff893698fac953dbbcdc3276e8ad13ed3267fb06"
        );
    }

    #[test]
    fn test_address_from_known_key() {
        // Private key 0x...01 maps to the well-known generator address.
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let secret = SecretKey::from_slice(&bytes).unwrap();
        let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);

        assert_eq!(
            address_from_public_key(&public),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }
}
