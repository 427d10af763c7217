//! Storage layer for challenges, users, and sessions.
//!
//! Each concern is a trait so the state machine never reaches for a
//! global handle. Redis implementations live in the submodules named after
//! the concern; `memory` holds in-process equivalents.
//!
//! Data is serialized to JSON for storage in Redis.

pub mod challenge;
pub mod memory;
pub mod session;
pub mod user;

use crate::models::{AuthTokens, ChallengeStatus, StoredChallenge, StoredSession, User};
use crate::auth::session::generate_challenge_nonce;
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

/// Failure of the underlying persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    /// Missing, in the wrong status, or past its expiry.
    #[error("Challenge not found or expired")]
    NotFoundOrExpired,

    #[error("Login session token already in use")]
    Conflict,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("Address already taken")]
    AddressTaken,

    #[error("User not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Unknown, expired, or replayed credential.
    #[error("Invalid or expired credential")]
    InvalidCredential,

    /// Revocation target does not exist (or was already rotated).
    #[error("Unknown credential")]
    UnknownCredential,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persistence for login challenges.
///
/// Backends provide three primitives; the protocol operations are built
/// on top of them. `transition` must be an atomic compare-and-set on
/// `status` so that concurrent callers cannot both move a record.
#[async_trait::async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Lifetime of a new challenge in seconds.
    fn ttl_secs(&self) -> u64;

    /// Look up a record regardless of status or expiry.
    async fn find(&self, login_session_token: &str)
        -> Result<Option<StoredChallenge>, StoreError>;

    /// Persist a new record; `Conflict` if the token exists.
    async fn insert_new(&self, record: &StoredChallenge) -> Result<(), ChallengeError>;

    /// Move `from -> to` if the record is currently `from`.
    /// `NotFoundOrExpired` if no record was in `from`.
    async fn transition(
        &self,
        login_session_token: &str,
        from: ChallengeStatus,
        to: ChallengeStatus,
        now: u64,
    ) -> Result<(), ChallengeError>;

    /// Issue a new challenge and return its nonce.
    async fn create(
        &self,
        login_session_token: &str,
        claimed_address: &str,
        now: u64,
    ) -> Result<String, ChallengeError> {
        let record = StoredChallenge::issue(
            login_session_token,
            claimed_address,
            generate_challenge_nonce(),
            self.ttl_secs(),
            now,
        );
        self.insert_new(&record).await?;
        Ok(record.nonce)
    }

    /// Fetch a live record in `Issued`.
    async fn get_issued(
        &self,
        login_session_token: &str,
        now: u64,
    ) -> Result<StoredChallenge, ChallengeError> {
        self.get_live(login_session_token, ChallengeStatus::Issued, now)
            .await
    }

    /// Fetch a live record in `Success`.
    async fn get_succeeded(
        &self,
        login_session_token: &str,
        now: u64,
    ) -> Result<StoredChallenge, ChallengeError> {
        self.get_live(login_session_token, ChallengeStatus::Success, now)
            .await
    }

    /// Record the verification outcome. Expiry is not re-checked here;
    /// reads enforce it.
    async fn mark_result(
        &self,
        login_session_token: &str,
        authenticated: bool,
        now: u64,
    ) -> Result<(), ChallengeError> {
        let to = if authenticated {
            ChallengeStatus::Success
        } else {
            ChallengeStatus::Fail
        };
        self.transition(login_session_token, ChallengeStatus::Issued, to, now)
            .await
    }

    /// `Success -> Consumed`. Exactly one concurrent caller wins.
    async fn consume(&self, login_session_token: &str, now: u64) -> Result<(), ChallengeError> {
        self.transition(
            login_session_token,
            ChallengeStatus::Success,
            ChallengeStatus::Consumed,
            now,
        )
        .await
    }

    async fn get_live(
        &self,
        login_session_token: &str,
        status: ChallengeStatus,
        now: u64,
    ) -> Result<StoredChallenge, ChallengeError> {
        match self.find(login_session_token).await? {
            Some(record) if record.status == status && !record.is_expired(now) => Ok(record),
            _ => Err(ChallengeError::NotFoundOrExpired),
        }
    }
}

/// Persistence for user records.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_address(&self, address: &str) -> Result<Option<User>, StoreError>;

    /// Insert a user; `AddressTaken` if another user holds the address.
    async fn create(&self, user: &User) -> Result<(), UserStoreError>;

    /// Replace a user; re-claims the address if it changed.
    async fn update(&self, user: &User) -> Result<(), UserStoreError>;

    async fn delete(&self, id: &str) -> Result<(), UserStoreError>;
}

/// Mints and checks opaque bearer credentials.
#[async_trait::async_trait]
pub trait SessionIssuer: Send + Sync {
    /// Mint an access + refresh pair for `user`.
    async fn issue(&self, user: &User, now: u64) -> Result<AuthTokens, SessionError>;

    /// Resolve an access token to its session.
    async fn authorize(&self, access_token: &str, now: u64)
        -> Result<StoredSession, SessionError>;

    /// Delete a refresh credential and its paired access session.
    async fn revoke(&self, refresh_token: &str) -> Result<(), SessionError>;

    /// Blacklist a refresh credential and return its user id. A credential
    /// can be redeemed once.
    async fn redeem(&self, refresh_token: &str, now: u64) -> Result<String, SessionError>;
}

/// Serialize a stored model to JSON.
pub(crate) fn encode<T: Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

/// Deserialize a stored model. The raw JSON is zeroized after use.
pub(crate) fn decode<T: DeserializeOwned>(data: String) -> Result<T, StoreError> {
    let zeroizing_data = Zeroizing::new(data);
    Ok(serde_json::from_str(&zeroizing_data)?)
}
