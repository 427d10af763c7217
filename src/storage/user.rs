//! User Redis operations.
//!
//! Redis key patterns:
//! - `user:{nanoid}` — individual user data (JSON)
//! - `address:{address}` — address lookup to user_id (STRING)
//!
//! The address key and the user key are written together by Lua scripts,
//! so two users can never hold the same address and a claim never outlives
//! a failed user write.

use super::{decode, encode, StoreError, UserStore, UserStoreError};
use crate::models::User;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

const USER_PREFIX: &str = "user:";
const ADDRESS_PREFIX: &str = "address:";

fn user_key(id: &str) -> String {
    format!("{}{}", USER_PREFIX, id)
}

fn address_key(address: &str) -> String {
    format!("{}{}", ADDRESS_PREFIX, address)
}

/// Get a user by ID.
pub async fn get_user<C>(con: &mut C, id: &str) -> Result<Option<User>, StoreError>
where
    C: AsyncCommands,
{
    let json: Option<String> = con.get(user_key(id)).await?;
    json.map(decode).transpose()
}

/// Get a user by address.
///
/// Performs a two-step lookup: address -> user_id -> user data.
pub async fn get_user_by_address<C>(con: &mut C, address: &str) -> Result<Option<User>, StoreError>
where
    C: AsyncCommands,
{
    let user_id: Option<String> = con.get(address_key(address)).await?;

    match user_id {
        Some(id) => get_user(con, &id).await,
        None => Ok(None),
    }
}

/// Claim an address and write the user in one step. Returns 1 on success,
/// 0 if the address belongs to another existing user. A claim left behind
/// by a user that no longer exists is taken over.
const CREATE_SCRIPT: &str = r"
local holder = redis.call('GET', KEYS[1])
if holder and holder ~= ARGV[1] and redis.call('EXISTS', ARGV[3] .. holder) == 1 then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[2], ARGV[2])
return 1
";

/// Replace a user, moving its address claim if the address changed.
/// Returns 1 on success, 0 if the new address is taken, -1 if the user
/// does not exist.
const UPDATE_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
    return -1
end
local holder = redis.call('GET', KEYS[2])
if holder and holder ~= ARGV[1] and redis.call('EXISTS', ARGV[3] .. holder) == 1 then
    return 0
end
local old_key = ARGV[4] .. cjson.decode(current).address
if old_key ~= KEYS[2] and redis.call('GET', old_key) == ARGV[1] then
    redis.call('DEL', old_key)
end
redis.call('SET', KEYS[2], ARGV[1])
redis.call('SET', KEYS[1], ARGV[2])
return 1
";

/// Delete a user and its address claim. Returns 0 if the user is missing.
const DELETE_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
    return 0
end
local address_key = ARGV[2] .. cjson.decode(current).address
if redis.call('GET', address_key) == ARGV[1] then
    redis.call('DEL', address_key)
end
redis.call('DEL', KEYS[1])
return 1
";

/// Store a new user together with its address claim.
pub async fn store_user<C>(con: &mut C, user: &User) -> Result<(), UserStoreError>
where
    C: AsyncCommands,
{
    let json = encode(user)?;
    let stored: i32 = redis::Script::new(CREATE_SCRIPT)
        .key(address_key(&user.address))
        .key(user_key(&user.id))
        .arg(&user.id)
        .arg(json)
        .arg(USER_PREFIX)
        .invoke_async(con)
        .await
        .map_err(StoreError::from)?;

    match stored {
        1 => Ok(()),
        _ => Err(UserStoreError::AddressTaken),
    }
}

/// Replace an existing user.
pub async fn update_user<C>(con: &mut C, user: &User) -> Result<(), UserStoreError>
where
    C: AsyncCommands,
{
    let json = encode(user)?;
    let updated: i32 = redis::Script::new(UPDATE_SCRIPT)
        .key(user_key(&user.id))
        .key(address_key(&user.address))
        .arg(&user.id)
        .arg(json)
        .arg(USER_PREFIX)
        .arg(ADDRESS_PREFIX)
        .invoke_async(con)
        .await
        .map_err(StoreError::from)?;

    match updated {
        1 => Ok(()),
        0 => Err(UserStoreError::AddressTaken),
        _ => Err(UserStoreError::NotFound),
    }
}

/// Delete a user and its address lookup.
pub async fn delete_user<C>(con: &mut C, id: &str) -> Result<(), UserStoreError>
where
    C: AsyncCommands,
{
    let deleted: i32 = redis::Script::new(DELETE_SCRIPT)
        .key(user_key(id))
        .arg(id)
        .arg(ADDRESS_PREFIX)
        .invoke_async(con)
        .await
        .map_err(StoreError::from)?;

    if deleted == 1 {
        Ok(())
    } else {
        Err(UserStoreError::NotFound)
    }
}

/// Redis-backed [`UserStore`].
#[derive(Clone)]
pub struct RedisUserStore {
    con: MultiplexedConnection,
}

impl RedisUserStore {
    pub fn new(con: MultiplexedConnection) -> Self {
        Self { con }
    }
}

#[async_trait::async_trait]
impl UserStore for RedisUserStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let mut con = self.con.clone();
        get_user(&mut con, id).await
    }

    async fn find_by_address(&self, address: &str) -> Result<Option<User>, StoreError> {
        let mut con = self.con.clone();
        get_user_by_address(&mut con, address).await
    }

    async fn create(&self, user: &User) -> Result<(), UserStoreError> {
        let mut con = self.con.clone();
        store_user(&mut con, user).await
    }

    async fn update(&self, user: &User) -> Result<(), UserStoreError> {
        let mut con = self.con.clone();
        update_user(&mut con, user).await
    }

    async fn delete(&self, id: &str) -> Result<(), UserStoreError> {
        let mut con = self.con.clone();
        delete_user(&mut con, id).await
    }
}
