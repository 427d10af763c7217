//! Request and response models for the API.
//!
//! Wire models use camelCase field names.
//! Storage models represent Redis data structures.

use serde::{Deserialize, Serialize};

// ============================================================================
// Auth Models
// ============================================================================

/// Request for a login challenge.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub login_session_token: String,
    pub claimed_address: String,
}

/// Response containing the nonce the wallet must sign.
#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub nonce: String,
}

/// Request to submit a signed challenge.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    pub login_session_token: String,
    pub signature: String, // 0x-prefixed hex r||s||v
}

#[derive(Debug, Serialize)]
pub struct AuthenticateResponse {
    pub authenticated: bool,
}

/// Request to redeem a succeeded challenge for a session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub login_session_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserView,
    pub access_credential: Credential,
    pub refresh_credential: Credential,
}

/// Request carrying a refresh credential (logout, rotation).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// An opaque bearer token and its expiry (Unix seconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub expires: u64,
}

/// Access + refresh pair minted by the session issuer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_credential: Credential,
    pub refresh_credential: Credential,
}

/// Public projection of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub address: String,
    pub role: Role,
    pub is_address_verified: bool,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        UserView {
            id: user.id.clone(),
            name: user.name.clone(),
            address: user.address.clone(),
            role: user.role,
            is_address_verified: user.is_address_verified,
        }
    }
}

// ============================================================================
// Storage Models
// ============================================================================

/// Lifecycle of a login challenge.
///
/// `Issued -> Success | Fail`, then `Success -> Consumed`. Nothing moves back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Issued,
    Success,
    Fail,
    Consumed,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeStatus::Issued => "issued",
            ChallengeStatus::Success => "success",
            ChallengeStatus::Fail => "fail",
            ChallengeStatus::Consumed => "consumed",
        }
    }

    /// Whether `self -> next` is an edge of the lifecycle.
    pub fn can_transition_to(&self, next: ChallengeStatus) -> bool {
        matches!(
            (self, next),
            (ChallengeStatus::Issued, ChallengeStatus::Success)
                | (ChallengeStatus::Issued, ChallengeStatus::Fail)
                | (ChallengeStatus::Success, ChallengeStatus::Consumed)
        )
    }
}

/// Challenge record as stored in Redis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChallenge {
    pub login_session_token: String,
    pub claimed_address: String, // lower-case
    pub nonce: String,
    pub expires_at: u64,
    pub status: ChallengeStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl StoredChallenge {
    /// Build a fresh `Issued` record expiring `ttl_secs` after `now`.
    pub fn issue(
        login_session_token: &str,
        claimed_address: &str,
        nonce: String,
        ttl_secs: u64,
        now: u64,
    ) -> Self {
        StoredChallenge {
            login_session_token: login_session_token.to_string(),
            claimed_address: claimed_address.to_lowercase(),
            nonce,
            expires_at: now.saturating_add(ttl_secs),
            status: ChallengeStatus::Issued,
            created_at: now,
            updated_at: now,
        }
    }

    /// A record is dead once `now` is past `expires_at`.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }
}

/// User data as stored in Redis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub address: String, // lower-case
    pub role: Role,
    pub is_address_verified: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Access session as stored in Redis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user_id: String,
    pub role: Role,
    pub created_at: u64,
    pub expires_at: u64,
}

/// Refresh credential as stored in Redis.
///
/// `blacklisted` is set when the credential is rotated; a second
/// presentation is a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRefresh {
    pub token: String,
    pub user_id: String,
    pub access_token: String,
    pub blacklisted: bool,
    pub created_at: u64,
    pub expires_at: u64,
}

// ============================================================================
// User Roles
// ============================================================================

/// User role types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}
