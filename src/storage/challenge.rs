//! Challenge Redis operations.
//!
//! Redis key patterns:
//! - `challenge:{login_session_token}` — challenge record (JSON)
//!
//! Keys carry a retention TTL for garbage collection only. The protocol
//! expiry is the record's `expires_at`, checked on every read.

use super::{decode, encode, ChallengeError, ChallengeStore, StoreError};
use crate::models::{ChallengeStatus, StoredChallenge};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

/// Compare-and-set on the stored status. Returns 1 if the record moved.
const TRANSITION_SCRIPT: &str = r"
local val = redis.call('GET', KEYS[1])
if not val then
    return 0
end
local record = cjson.decode(val)
if record.status ~= ARGV[1] then
    return 0
end
record.status = ARGV[2]
record.updated_at = tonumber(ARGV[3])
redis.call('SET', KEYS[1], cjson.encode(record), 'KEEPTTL')
return 1
";

fn challenge_key(login_session_token: &str) -> String {
    format!("challenge:{}", login_session_token)
}

/// Store a new challenge unless the token is already taken.
///
/// Returns false when a record with the same token exists.
pub async fn insert_challenge<C>(
    con: &mut C,
    challenge: &StoredChallenge,
    retention_secs: u64,
) -> Result<bool, StoreError>
where
    C: AsyncCommands,
{
    let key = challenge_key(&challenge.login_session_token);
    let json = encode(challenge)?;

    // SET NX replies nil when the key exists
    let reply: Option<String> = redis::cmd("SET")
        .arg(&key)
        .arg(json)
        .arg("NX")
        .arg("EX")
        .arg(retention_secs)
        .query_async(con)
        .await?;

    Ok(reply.is_some())
}

/// Get a challenge by login session token.
pub async fn get_challenge<C>(
    con: &mut C,
    login_session_token: &str,
) -> Result<Option<StoredChallenge>, StoreError>
where
    C: AsyncCommands,
{
    let key = challenge_key(login_session_token);
    let json: Option<String> = con.get(&key).await?;

    json.map(decode).transpose()
}

/// Atomically move a challenge from `from` to `to`.
///
/// Uses a Lua script so a concurrent caller observes the new status.
pub async fn transition_challenge<C>(
    con: &mut C,
    login_session_token: &str,
    from: ChallengeStatus,
    to: ChallengeStatus,
    now: u64,
) -> Result<bool, StoreError>
where
    C: AsyncCommands,
{
    let key = challenge_key(login_session_token);
    let script = redis::Script::new(TRANSITION_SCRIPT);

    let moved: i32 = script
        .key(&key)
        .arg(from.as_str())
        .arg(to.as_str())
        .arg(now)
        .invoke_async(con)
        .await?;

    Ok(moved == 1)
}

/// Redis-backed [`ChallengeStore`].
#[derive(Clone)]
pub struct RedisChallengeStore {
    con: MultiplexedConnection,
    ttl_secs: u64,
    retention_secs: u64,
}

impl RedisChallengeStore {
    pub fn new(con: MultiplexedConnection, ttl_secs: u64, retention_secs: u64) -> Self {
        Self {
            con,
            ttl_secs,
            retention_secs: retention_secs.max(ttl_secs),
        }
    }
}

#[async_trait::async_trait]
impl ChallengeStore for RedisChallengeStore {
    fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    async fn find(
        &self,
        login_session_token: &str,
    ) -> Result<Option<StoredChallenge>, StoreError> {
        let mut con = self.con.clone();
        get_challenge(&mut con, login_session_token).await
    }

    async fn insert_new(&self, record: &StoredChallenge) -> Result<(), ChallengeError> {
        let mut con = self.con.clone();
        if insert_challenge(&mut con, record, self.retention_secs).await? {
            Ok(())
        } else {
            Err(ChallengeError::Conflict)
        }
    }

    async fn transition(
        &self,
        login_session_token: &str,
        from: ChallengeStatus,
        to: ChallengeStatus,
        now: u64,
    ) -> Result<(), ChallengeError> {
        let mut con = self.con.clone();
        if transition_challenge(&mut con, login_session_token, from, to, now).await? {
            Ok(())
        } else {
            Err(ChallengeError::NotFoundOrExpired)
        }
    }
}
