//! Session Redis operations.
//!
//! Redis key patterns:
//! - `session:{token}` — access session (JSON), TTL = access lifetime
//! - `refresh:{token}` — refresh credential (JSON), TTL = refresh lifetime
//!
//! A refresh record remembers its paired access token so revocation and
//! rotation can end both at once.

use super::{decode, encode, SessionError, SessionIssuer, StoreError};
use crate::auth::session::generate_session_token;
use crate::models::{AuthTokens, Credential, StoredRefresh, StoredSession, User};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

const SESSION_PREFIX: &str = "session:";
const REFRESH_PREFIX: &str = "refresh:";

/// Delete a live refresh record and its access session. Returns 1 on success,
/// 0 if the record is missing or blacklisted.
const REVOKE_SCRIPT: &str = r"
local val = redis.call('GET', KEYS[1])
if not val then
    return 0
end
local record = cjson.decode(val)
if record.blacklisted then
    return 0
end
redis.call('DEL', KEYS[1])
redis.call('DEL', ARGV[1] .. record.access_token)
return 1
";

/// Blacklist a refresh record and drop its access session. Returns the
/// record as it was before the update, or nil.
const REDEEM_SCRIPT: &str = r"
local val = redis.call('GET', KEYS[1])
if not val then
    return nil
end
local record = cjson.decode(val)
if not record.blacklisted then
    record.blacklisted = true
    redis.call('SET', KEYS[1], cjson.encode(record), 'KEEPTTL')
    redis.call('DEL', ARGV[1] .. record.access_token)
end
return val
";

/// Store an access session with TTL.
pub async fn store_session<C>(
    con: &mut C,
    session: &StoredSession,
    ttl_secs: u64,
) -> Result<(), StoreError>
where
    C: AsyncCommands,
{
    let key = format!("{}{}", SESSION_PREFIX, session.token);
    let json = encode(session)?;

    con.set_ex::<_, _, ()>(&key, json, ttl_secs).await?;
    Ok(())
}

/// Store a refresh credential with TTL.
pub async fn store_refresh<C>(
    con: &mut C,
    refresh: &StoredRefresh,
    ttl_secs: u64,
) -> Result<(), StoreError>
where
    C: AsyncCommands,
{
    let key = format!("{}{}", REFRESH_PREFIX, refresh.token);
    let json = encode(refresh)?;

    con.set_ex::<_, _, ()>(&key, json, ttl_secs).await?;
    Ok(())
}

/// Get an access session by token.
pub async fn get_session<C>(con: &mut C, token: &str) -> Result<Option<StoredSession>, StoreError>
where
    C: AsyncCommands,
{
    let key = format!("{}{}", SESSION_PREFIX, token);
    let json: Option<String> = con.get(&key).await?;

    json.map(decode).transpose()
}

/// Revoke a refresh credential and its access session atomically.
///
/// Returns true if a live credential was revoked.
pub async fn revoke_refresh<C>(con: &mut C, token: &str) -> Result<bool, StoreError>
where
    C: AsyncCommands,
{
    let key = format!("{}{}", REFRESH_PREFIX, token);
    let revoked: i32 = redis::Script::new(REVOKE_SCRIPT)
        .key(&key)
        .arg(SESSION_PREFIX)
        .invoke_async(con)
        .await?;

    Ok(revoked == 1)
}

/// Blacklist a refresh credential atomically, returning its prior state.
pub async fn redeem_refresh<C>(con: &mut C, token: &str) -> Result<Option<StoredRefresh>, StoreError>
where
    C: AsyncCommands,
{
    let key = format!("{}{}", REFRESH_PREFIX, token);
    let json: Option<String> = redis::Script::new(REDEEM_SCRIPT)
        .key(&key)
        .arg(SESSION_PREFIX)
        .invoke_async(con)
        .await?;

    json.map(decode).transpose()
}

/// Build the access/refresh pair for `user` without persisting it.
pub(crate) fn mint_tokens(
    user: &User,
    now: u64,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
) -> (StoredSession, StoredRefresh) {
    let session = StoredSession {
        token: generate_session_token(),
        user_id: user.id.clone(),
        role: user.role,
        created_at: now,
        expires_at: now.saturating_add(access_ttl_secs),
    };
    let refresh = StoredRefresh {
        token: generate_session_token(),
        user_id: user.id.clone(),
        access_token: session.token.clone(),
        blacklisted: false,
        created_at: now,
        expires_at: now.saturating_add(refresh_ttl_secs),
    };
    (session, refresh)
}

pub(crate) fn tokens_of(session: &StoredSession, refresh: &StoredRefresh) -> AuthTokens {
    AuthTokens {
        access_credential: Credential {
            token: session.token.clone(),
            expires: session.expires_at,
        },
        refresh_credential: Credential {
            token: refresh.token.clone(),
            expires: refresh.expires_at,
        },
    }
}

/// Redis-backed [`SessionIssuer`].
#[derive(Clone)]
pub struct RedisSessionIssuer {
    con: MultiplexedConnection,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl RedisSessionIssuer {
    pub fn new(con: MultiplexedConnection, access_ttl_secs: u64, refresh_ttl_secs: u64) -> Self {
        Self {
            con,
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }
}

#[async_trait::async_trait]
impl SessionIssuer for RedisSessionIssuer {
    async fn issue(&self, user: &User, now: u64) -> Result<AuthTokens, SessionError> {
        let mut con = self.con.clone();
        let (session, refresh) = mint_tokens(user, now, self.access_ttl_secs, self.refresh_ttl_secs);

        store_session(&mut con, &session, self.access_ttl_secs).await?;
        store_refresh(&mut con, &refresh, self.refresh_ttl_secs).await?;

        Ok(tokens_of(&session, &refresh))
    }

    async fn authorize(
        &self,
        access_token: &str,
        now: u64,
    ) -> Result<StoredSession, SessionError> {
        let mut con = self.con.clone();
        match get_session(&mut con, access_token).await? {
            Some(session) if now <= session.expires_at => Ok(session),
            _ => Err(SessionError::InvalidCredential),
        }
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), SessionError> {
        let mut con = self.con.clone();
        if revoke_refresh(&mut con, refresh_token).await? {
            Ok(())
        } else {
            Err(SessionError::UnknownCredential)
        }
    }

    async fn redeem(&self, refresh_token: &str, now: u64) -> Result<String, SessionError> {
        let mut con = self.con.clone();
        match redeem_refresh(&mut con, refresh_token).await? {
            Some(refresh) if refresh.blacklisted => {
                tracing::warn!(action = "refresh_replayed", user_id = %refresh.user_id, "Rotated refresh token presented again");
                Err(SessionError::InvalidCredential)
            }
            Some(refresh) if now <= refresh.expires_at => Ok(refresh.user_id),
            _ => Err(SessionError::InvalidCredential),
        }
    }
}
