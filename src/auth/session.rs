//! Token and nonce generation for authentication.

use base64::{engine::general_purpose, Engine as _};
use rand::Rng;

/// Prefix of every challenge nonce shown to the wallet.
pub const NONCE_PREFIX: &str = "signin-";

/// Generate a cryptographically random session token.
///
/// Returns a base64-encoded string (44 characters) from 32 random bytes.
pub fn generate_session_token() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}

/// Generate a challenge nonce: `signin-` followed by a random UUID.
pub fn generate_challenge_nonce() -> String {
    format!("{}{}", NONCE_PREFIX, uuid::Uuid::new_v4())
}
