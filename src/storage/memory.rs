//! In-process implementations of the storage traits.
//!
//! State lives behind a `tokio::sync::RwLock`; every mutation takes the
//! write lock for its whole check-then-write, which gives the same
//! atomicity the Redis scripts provide. Nothing expires on its own: a
//! process restart is the cleanup.

use super::session::{mint_tokens, tokens_of};
use super::{
    ChallengeError, ChallengeStore, SessionError, SessionIssuer, StoreError, UserStore,
    UserStoreError,
};
use crate::models::{AuthTokens, ChallengeStatus, StoredChallenge, StoredRefresh, StoredSession, User};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================================================
// Challenges
// ============================================================================

#[derive(Clone)]
pub struct MemoryChallengeStore {
    records: Arc<RwLock<HashMap<String, StoredChallenge>>>,
    ttl_secs: u64,
}

impl MemoryChallengeStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            ttl_secs,
        }
    }

    /// Put a record as-is, replacing any existing one. Test fixture helper.
    pub async fn put(&self, record: StoredChallenge) {
        self.records
            .write()
            .await
            .insert(record.login_session_token.clone(), record);
    }
}

#[async_trait::async_trait]
impl ChallengeStore for MemoryChallengeStore {
    fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    async fn find(
        &self,
        login_session_token: &str,
    ) -> Result<Option<StoredChallenge>, StoreError> {
        Ok(self.records.read().await.get(login_session_token).cloned())
    }

    async fn insert_new(&self, record: &StoredChallenge) -> Result<(), ChallengeError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.login_session_token) {
            return Err(ChallengeError::Conflict);
        }
        records.insert(record.login_session_token.clone(), record.clone());
        Ok(())
    }

    async fn transition(
        &self,
        login_session_token: &str,
        from: ChallengeStatus,
        to: ChallengeStatus,
        now: u64,
    ) -> Result<(), ChallengeError> {
        let mut records = self.records.write().await;
        match records.get_mut(login_session_token) {
            Some(record) if record.status == from && from.can_transition_to(to) => {
                record.status = to;
                record.updated_at = now;
                Ok(())
            }
            _ => Err(ChallengeError::NotFoundOrExpired),
        }
    }
}

// ============================================================================
// Users
// ============================================================================

#[derive(Default)]
struct UserState {
    users_by_id: HashMap<String, User>,
    id_by_address: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct MemoryUserStore {
    state: Arc<RwLock<UserState>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users_by_id.get(id).cloned())
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .id_by_address
            .get(address)
            .and_then(|id| state.users_by_id.get(id))
            .cloned())
    }

    async fn create(&self, user: &User) -> Result<(), UserStoreError> {
        let mut state = self.state.write().await;
        if state.id_by_address.contains_key(&user.address) {
            return Err(UserStoreError::AddressTaken);
        }
        state
            .id_by_address
            .insert(user.address.clone(), user.id.clone());
        state.users_by_id.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<(), UserStoreError> {
        let mut state = self.state.write().await;
        let existing_address = state
            .users_by_id
            .get(&user.id)
            .map(|u| u.address.clone())
            .ok_or(UserStoreError::NotFound)?;

        if existing_address != user.address {
            if state.id_by_address.contains_key(&user.address) {
                return Err(UserStoreError::AddressTaken);
            }
            state.id_by_address.remove(&existing_address);
            state
                .id_by_address
                .insert(user.address.clone(), user.id.clone());
        }
        state.users_by_id.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), UserStoreError> {
        let mut state = self.state.write().await;
        let user = state
            .users_by_id
            .remove(id)
            .ok_or(UserStoreError::NotFound)?;
        state.id_by_address.remove(&user.address);
        Ok(())
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Default)]
struct SessionState {
    sessions: HashMap<String, StoredSession>,
    refreshes: HashMap<String, StoredRefresh>,
}

#[derive(Clone)]
pub struct MemorySessionIssuer {
    state: Arc<RwLock<SessionState>>,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl MemorySessionIssuer {
    pub fn new(access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(SessionState::default())),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }
}

#[async_trait::async_trait]
impl SessionIssuer for MemorySessionIssuer {
    async fn issue(&self, user: &User, now: u64) -> Result<AuthTokens, SessionError> {
        let (session, refresh) = mint_tokens(user, now, self.access_ttl_secs, self.refresh_ttl_secs);
        let tokens = tokens_of(&session, &refresh);

        let mut state = self.state.write().await;
        state.sessions.insert(session.token.clone(), session);
        state.refreshes.insert(refresh.token.clone(), refresh);
        Ok(tokens)
    }

    async fn authorize(
        &self,
        access_token: &str,
        now: u64,
    ) -> Result<StoredSession, SessionError> {
        match self.state.read().await.sessions.get(access_token) {
            Some(session) if now <= session.expires_at => Ok(session.clone()),
            _ => Err(SessionError::InvalidCredential),
        }
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), SessionError> {
        let mut state = self.state.write().await;
        let access_token = match state.refreshes.get(refresh_token) {
            Some(refresh) if !refresh.blacklisted => refresh.access_token.clone(),
            _ => return Err(SessionError::UnknownCredential),
        };

        state.refreshes.remove(refresh_token);
        state.sessions.remove(&access_token);
        Ok(())
    }

    async fn redeem(&self, refresh_token: &str, now: u64) -> Result<String, SessionError> {
        let mut state = self.state.write().await;
        let Some(refresh) = state.refreshes.get_mut(refresh_token) else {
            return Err(SessionError::InvalidCredential);
        };

        if refresh.blacklisted {
            tracing::warn!(action = "refresh_replayed", user_id = %refresh.user_id, "Rotated refresh token presented again");
            return Err(SessionError::InvalidCredential);
        }
        refresh.blacklisted = true;
        let user_id = refresh.user_id.clone();
        let access_token = refresh.access_token.clone();
        let live = now <= refresh.expires_at;

        state.sessions.remove(&access_token);
        if live {
            Ok(user_id)
        } else {
            Err(SessionError::InvalidCredential)
        }
    }
}
