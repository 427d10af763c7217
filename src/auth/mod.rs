//! Wallet authentication: challenge issuance, secp256k1 signature
//! verification, and the login state machine.

pub mod address;
pub mod middleware;
pub mod service;
pub mod session;
pub mod verify;

pub use middleware::{AppState, AuthSession};
pub use service::{AuthError, AuthService, LoginOutcome};
pub use session::{generate_challenge_nonce, generate_session_token};
pub use verify::{sign_challenge, verify_signature, VerificationError};
