//! Wallet login state machine.
//!
//! ```text
//! ISSUED --(authenticate, sig valid)--> SUCCESS --(login)--> CONSUMED
//! ISSUED --(authenticate, sig invalid)--> FAIL
//! ```
//!
//! Every transition is a conditional write in the [`ChallengeStore`], so a
//! challenge can be authenticated against once and redeemed once.

use crate::auth::address::{is_valid_address, normalize_address};
use crate::auth::verify::{verify_signature, VerificationError};
use crate::models::{AuthTokens, Role, User, UserView};
use crate::storage::{
    ChallengeError, ChallengeStore, SessionError, SessionIssuer, StoreError, UserStore,
    UserStoreError,
};
use std::sync::Arc;

/// Upper bound on client-supplied login session tokens.
const MAX_LOGIN_SESSION_TOKEN_LEN: usize = 256;

/// Source of the current time in Unix seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// System clock.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed input; the message names the field.
    #[error("{0}")]
    Validation(String),

    /// Challenge missing, in the wrong status, or expired. Deliberately
    /// does not say which.
    #[error("Incorrect or expired token")]
    NotFoundOrExpired,

    #[error("{0}")]
    Conflict(String),

    #[error("Error with signature verification: {0}")]
    Verification(#[from] VerificationError),

    /// Missing or invalid session credential.
    #[error("Please authenticate")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ChallengeError> for AuthError {
    fn from(err: ChallengeError) -> Self {
        match err {
            ChallengeError::NotFoundOrExpired => AuthError::NotFoundOrExpired,
            ChallengeError::Conflict => {
                AuthError::Conflict("Login session token already in use".to_string())
            }
            ChallengeError::Store(e) => AuthError::Store(e),
        }
    }
}

impl From<UserStoreError> for AuthError {
    fn from(err: UserStoreError) -> Self {
        match err {
            UserStoreError::AddressTaken => AuthError::Conflict("Address already taken".to_string()),
            UserStoreError::NotFound => AuthError::NotFound,
            UserStoreError::Store(e) => AuthError::Store(e),
        }
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidCredential => AuthError::Unauthorized,
            SessionError::UnknownCredential => AuthError::NotFound,
            SessionError::Store(e) => AuthError::Store(e),
        }
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub tokens: AuthTokens,
}

/// Orchestrates challenge issuance, verification, and redemption.
#[derive(Clone)]
pub struct AuthService {
    challenges: Arc<dyn ChallengeStore>,
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionIssuer>,
    default_user_name: String,
    clock: Clock,
}

impl AuthService {
    pub fn new(
        challenges: Arc<dyn ChallengeStore>,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionIssuer>,
        default_user_name: impl Into<String>,
    ) -> Self {
        Self {
            challenges,
            users,
            sessions,
            default_user_name: default_user_name.into(),
            clock: Arc::new(unix_now),
        }
    }

    /// Replace the system clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Issue a challenge nonce bound to `claimed_address`.
    pub async fn start_session(
        &self,
        login_session_token: &str,
        claimed_address: &str,
    ) -> Result<String, AuthError> {
        validate_login_session_token(login_session_token)?;
        let address = normalize_address(claimed_address);
        if !is_valid_address(&address) {
            return Err(AuthError::Validation(
                "\"claimedAddress\" must be a valid address".to_string(),
            ));
        }

        let nonce = self
            .challenges
            .create(login_session_token, &address, self.now())
            .await?;

        tracing::info!(action = "challenge_issued", address = %address, "Login challenge issued");
        Ok(nonce)
    }

    /// Verify a signature over the challenge and record the outcome.
    ///
    /// A malformed signature is an error and leaves the challenge `ISSUED`.
    /// A valid signature from the wrong key records `FAIL` and returns false.
    pub async fn authenticate(
        &self,
        login_session_token: &str,
        signature: &str,
    ) -> Result<bool, AuthError> {
        validate_login_session_token(login_session_token)?;
        if signature.is_empty() {
            return Err(AuthError::Validation(
                "\"signature\" is required".to_string(),
            ));
        }

        let record = self
            .challenges
            .get_issued(login_session_token, self.now())
            .await?;

        let authenticated = verify_signature(&record.nonce, &record.claimed_address, signature)?;

        self.challenges
            .mark_result(login_session_token, authenticated, self.now())
            .await?;

        if authenticated {
            tracing::info!(action = "auth_success", address = %record.claimed_address, "Challenge signature verified");
        } else {
            tracing::warn!(action = "auth_failed", address = %record.claimed_address, "Signature from a different key");
        }
        Ok(authenticated)
    }

    /// Redeem a succeeded challenge for a user and fresh credentials.
    ///
    /// The challenge is consumed before the user is touched, so of several
    /// concurrent logins on the same token only one gets past `consume`.
    pub async fn login(&self, login_session_token: &str) -> Result<LoginOutcome, AuthError> {
        validate_login_session_token(login_session_token)?;
        let now = self.now();

        let record = self
            .challenges
            .get_succeeded(login_session_token, now)
            .await?;
        self.challenges.consume(login_session_token, now).await?;

        let user = self.find_or_provision(&record.claimed_address, now).await?;
        let tokens = self.sessions.issue(&user, now).await?;

        tracing::info!(action = "login", user_id = %user.id, address = %user.address, "User logged in");
        Ok(LoginOutcome { user, tokens })
    }

    async fn find_or_provision(&self, address: &str, now: u64) -> Result<User, AuthError> {
        if let Some(user) = self.users.find_by_address(address).await? {
            return Ok(user);
        }

        let user = User {
            id: nanoid::nanoid!(12),
            name: self.default_user_name.clone(),
            address: address.to_string(),
            role: Role::User,
            is_address_verified: true,
            created_at: now,
            updated_at: now,
        };

        match self.users.create(&user).await {
            Ok(()) => {
                tracing::info!(action = "user_provisioned", user_id = %user.id, address = %user.address, "New user provisioned");
                Ok(user)
            }
            // Another login provisioned the same address first
            Err(UserStoreError::AddressTaken) => self
                .users
                .find_by_address(address)
                .await?
                .ok_or_else(|| AuthError::Conflict("Address already taken".to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Revoke a refresh credential and its access session.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.sessions.revoke(refresh_token).await?;
        tracing::info!(action = "logout", "Refresh token revoked");
        Ok(())
    }

    /// Exchange a refresh credential for a new pair. The presented
    /// credential cannot be used again.
    pub async fn rotate(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let now = self.now();
        let user_id = self
            .sessions
            .redeem(refresh_token, now)
            .await
            .map_err(|e| match e {
                SessionError::Store(e) => AuthError::Store(e),
                _ => AuthError::Unauthorized,
            })?;

        let user = self
            .users
            .find_by_id(&user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        let tokens = self.sessions.issue(&user, now).await?;

        tracing::info!(action = "tokens_rotated", user_id = %user.id, "Refresh token rotated");
        Ok(tokens)
    }

    /// Resolve an access token to the user it was issued for.
    pub async fn current_user(&self, access_token: &str) -> Result<UserView, AuthError> {
        let session = self.sessions.authorize(access_token, self.now()).await?;
        let user = self
            .users
            .find_by_id(&session.user_id)
            .await?
            .ok_or(AuthError::Unauthorized)?;
        Ok(UserView::from(&user))
    }
}

fn validate_login_session_token(token: &str) -> Result<(), AuthError> {
    if token.is_empty() {
        return Err(AuthError::Validation(
            "\"loginSessionToken\" is required".to_string(),
        ));
    }
    if token.len() > MAX_LOGIN_SESSION_TOKEN_LEN {
        return Err(AuthError::Validation(format!(
            "\"loginSessionToken\" must be at most {} characters",
            MAX_LOGIN_SESSION_TOKEN_LEN
        )));
    }
    Ok(())
}
