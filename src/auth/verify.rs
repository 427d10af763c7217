//! Recoverable secp256k1 signature verification.
//!
//! The wallet signs `keccak256(keccak256(nonce_utf8))` and submits the
//! 65-byte `r || s || v` signature as hex. The signer is identified by
//! recovering the public key and deriving its address.

use crate::auth::address::{address_from_public_key, normalize_address};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

const SIGNATURE_BYTES: usize = 65;

/// Malformed signature or failed key recovery.
///
/// A well-formed signature from the wrong key is not an error; see
/// [`verify_signature`].
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Invalid signature hex: {0}")]
    Encoding(#[from] hex::FromHexError),

    #[error("Invalid signature length: expected 65 bytes, got {0}")]
    Length(usize),

    #[error("Invalid recovery id: {0}")]
    RecoveryId(u8),

    #[error("Public key recovery failed: {0}")]
    Recovery(#[from] secp256k1::Error),
}

/// Digest the wallet signs for a challenge: keccak256 applied twice.
pub fn challenge_digest(nonce: &str) -> [u8; 32] {
    let first = Keccak256::digest(nonce.as_bytes());
    let second = Keccak256::digest(first);

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&second);
    digest
}

/// Verify that `signature` over `nonce` was produced by `claimed_address`.
///
/// # Returns
/// * `Ok(true)` if the recovered address matches (case-insensitive)
/// * `Ok(false)` if the signature is valid but from another key or message
/// * `Err(VerificationError)` if the signature cannot be parsed or recovered
pub fn verify_signature(
    nonce: &str,
    claimed_address: &str,
    signature: &str,
) -> Result<bool, VerificationError> {
    let signature_hex = signature.strip_prefix("0x").unwrap_or(signature);
    let bytes = hex::decode(signature_hex)?;

    if bytes.len() != SIGNATURE_BYTES {
        return Err(VerificationError::Length(bytes.len()));
    }

    // RPC encoding: v is 27/28, some wallets send 0/1
    let v = bytes[64];
    let recovery = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(VerificationError::RecoveryId(other)),
    };

    let recovery_id = RecoveryId::from_i32(i32::from(recovery))?;
    let recoverable = RecoverableSignature::from_compact(&bytes[..64], recovery_id)?;

    let message = Message::from_digest(challenge_digest(nonce));
    let public_key = Secp256k1::verification_only().recover_ecdsa(&message, &recoverable)?;

    let signer = address_from_public_key(&public_key);
    Ok(signer == normalize_address(claimed_address))
}

/// Sign a challenge the way the wallet does.
///
/// Returns `0x`-prefixed hex of `r || s || v` with `v` in `{27, 28}`.
pub fn sign_challenge(secret_key: &SecretKey, nonce: &str) -> String {
    let message = Message::from_digest(challenge_digest(nonce));
    let signature = Secp256k1::signing_only().sign_ecdsa_recoverable(&message, secret_key);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut bytes = Vec::with_capacity(SIGNATURE_BYTES);
    bytes.extend_from_slice(&compact);
    // recovery ids are 0..=3; only 0 and 1 occur for valid signatures
    bytes.push(27 + recovery_id.to_i32() as u8);
    format!("0x{}", hex::encode(bytes))
}
