//! Tests for the Redis-backed stores.
//!
//! These tests need a running Redis instance (default: redis://127.0.0.1:6379).
//! Set REDIS_URL env var to override. When no server answers, each test
//! returns early.

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::sync::Arc;
use walletgate::{
    auth::{AuthError, AuthService},
    models::{ChallengeStatus, Role, User},
    storage::{
        challenge::RedisChallengeStore, session::RedisSessionIssuer, user::RedisUserStore,
        ChallengeError, ChallengeStore, SessionError, SessionIssuer, UserStore, UserStoreError,
    },
};

/// Helper to get Redis URL from environment or use default.
fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Connect to Redis, or None if it is not reachable.
async fn connect() -> Option<MultiplexedConnection> {
    let client = redis::Client::open(redis_url()).ok()?;
    let connect = client.get_multiplexed_async_connection();
    match tokio::time::timeout(std::time::Duration::from_secs(2), connect).await {
        Ok(Ok(con)) => Some(con),
        _ => {
            eprintln!("Redis not available at {}, skipping", redis_url());
            None
        }
    }
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, nanoid::nanoid!(16))
}

/// A random, well-formed address nobody else will use.
fn unique_address() -> String {
    let mut bytes = [0u8; 20];
    rand::fill(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}

fn test_user(address: &str) -> User {
    User {
        id: nanoid::nanoid!(12),
        name: "unnamed".to_string(),
        address: address.to_string(),
        role: Role::User,
        is_address_verified: true,
        created_at: 1_000,
        updated_at: 1_000,
    }
}

// ============================================================================
// Challenge Store Tests
// ============================================================================

#[tokio::test]
async fn test_challenge_lifecycle() {
    let Some(con) = connect().await else { return };
    let store = RedisChallengeStore::new(con, 120, 600);
    let token = unique("lst");
    let address = unique_address();

    let nonce = store.create(&token, &address, 1_000).await.unwrap();
    assert!(nonce.starts_with("signin-"));

    let record = store.get_issued(&token, 1_000).await.unwrap();
    assert_eq!(record.nonce, nonce);
    assert_eq!(record.claimed_address, address);
    assert_eq!(record.expires_at, 1_120);

    store.mark_result(&token, true, 1_010).await.unwrap();
    let record = store.get_succeeded(&token, 1_010).await.unwrap();
    assert_eq!(record.status, ChallengeStatus::Success);
    assert_eq!(record.updated_at, 1_010);

    store.consume(&token, 1_020).await.unwrap();
    let record = store.find(&token).await.unwrap().unwrap();
    assert_eq!(record.status, ChallengeStatus::Consumed);
    assert!(matches!(
        store.consume(&token, 1_021).await,
        Err(ChallengeError::NotFoundOrExpired)
    ));
}

#[tokio::test]
async fn test_challenge_conflict() {
    let Some(con) = connect().await else { return };
    let store = RedisChallengeStore::new(con, 120, 600);
    let token = unique("lst");
    let address = unique_address();

    let nonce = store.create(&token, &address, 1_000).await.unwrap();
    assert!(matches!(
        store.create(&token, &address, 1_001).await,
        Err(ChallengeError::Conflict)
    ));

    // The original record is untouched
    let record = store.find(&token).await.unwrap().unwrap();
    assert_eq!(record.nonce, nonce);
}

#[tokio::test]
async fn test_challenge_expiry_is_logical() {
    let Some(con) = connect().await else { return };
    let store = RedisChallengeStore::new(con, 120, 600);
    let token = unique("lst");

    store.create(&token, &unique_address(), 1_000).await.unwrap();

    assert!(store.get_issued(&token, 1_120).await.is_ok());
    assert!(matches!(
        store.get_issued(&token, 1_121).await,
        Err(ChallengeError::NotFoundOrExpired)
    ));

    // Still retained for inspection
    assert!(store.find(&token).await.unwrap().is_some());
}

#[tokio::test]
async fn test_challenge_marked_once() {
    let Some(con) = connect().await else { return };
    let store = RedisChallengeStore::new(con, 120, 600);
    let token = unique("lst");

    store.create(&token, &unique_address(), 1_000).await.unwrap();
    store.mark_result(&token, false, 1_001).await.unwrap();

    assert!(matches!(
        store.mark_result(&token, true, 1_002).await,
        Err(ChallengeError::NotFoundOrExpired)
    ));
    let record = store.find(&token).await.unwrap().unwrap();
    assert_eq!(record.status, ChallengeStatus::Fail);
}

#[tokio::test]
async fn test_concurrent_consume_single_winner() {
    let Some(con) = connect().await else { return };
    let store = Arc::new(RedisChallengeStore::new(con, 120, 600));
    let token = unique("lst");

    store.create(&token, &unique_address(), 1_000).await.unwrap();
    store.mark_result(&token, true, 1_001).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            store.consume(&token, 1_002).await.is_ok()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

// ============================================================================
// User Store Tests
// ============================================================================

#[tokio::test]
async fn test_user_address_uniqueness() {
    let Some(con) = connect().await else { return };
    let store = RedisUserStore::new(con);
    let address = unique_address();

    let user = test_user(&address);
    store.create(&user).await.unwrap();

    let found = store.find_by_address(&address).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    let found = store.find_by_id(&user.id).await.unwrap().unwrap();
    assert_eq!(found.address, address);

    let rival = test_user(&address);
    assert!(matches!(
        store.create(&rival).await,
        Err(UserStoreError::AddressTaken)
    ));
    assert!(store.find_by_id(&rival.id).await.unwrap().is_none());

    store.delete(&user.id).await.unwrap();
}

#[tokio::test]
async fn test_user_create_takes_over_orphaned_claim() {
    let Some(mut con) = connect().await else { return };
    let store = RedisUserStore::new(con.clone());
    let address = unique_address();

    // Address claim whose user record was never written
    con.set::<_, _, ()>(format!("address:{}", address), nanoid::nanoid!(12))
        .await
        .unwrap();
    assert!(store.find_by_address(&address).await.unwrap().is_none());

    let user = test_user(&address);
    store.create(&user).await.unwrap();

    let found = store.find_by_address(&address).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);

    store.delete(&user.id).await.unwrap();
}

#[tokio::test]
async fn test_user_update_to_taken_address() {
    let Some(con) = connect().await else { return };
    let store = RedisUserStore::new(con);
    let first = test_user(&unique_address());
    let mut second = test_user(&unique_address());
    store.create(&first).await.unwrap();
    store.create(&second).await.unwrap();

    let original = second.address.clone();
    second.address = first.address.clone();
    assert!(matches!(
        store.update(&second).await,
        Err(UserStoreError::AddressTaken)
    ));

    // Nothing moved
    let found = store.find_by_address(&original).await.unwrap().unwrap();
    assert_eq!(found.id, second.id);
    let found = store.find_by_address(&first.address).await.unwrap().unwrap();
    assert_eq!(found.id, first.id);

    store.delete(&first.id).await.unwrap();
    store.delete(&second.id).await.unwrap();
}

#[tokio::test]
async fn test_user_update_and_delete() {
    let Some(con) = connect().await else { return };
    let store = RedisUserStore::new(con);
    let old_address = unique_address();
    let new_address = unique_address();

    let mut user = test_user(&old_address);
    store.create(&user).await.unwrap();

    user.address = new_address.clone();
    user.name = "alice".to_string();
    store.update(&user).await.unwrap();

    assert!(store.find_by_address(&old_address).await.unwrap().is_none());
    let found = store.find_by_address(&new_address).await.unwrap().unwrap();
    assert_eq!(found.name, "alice");

    store.delete(&user.id).await.unwrap();
    assert!(store.find_by_id(&user.id).await.unwrap().is_none());
    assert!(store.find_by_address(&new_address).await.unwrap().is_none());
    assert!(matches!(
        store.delete(&user.id).await,
        Err(UserStoreError::NotFound)
    ));
}

// ============================================================================
// Session Issuer Tests
// ============================================================================

#[tokio::test]
async fn test_session_issue_authorize_revoke() {
    let Some(con) = connect().await else { return };
    let issuer = RedisSessionIssuer::new(con, 1_800, 3_600);
    let user = test_user(&unique_address());
    let now = walletgate::auth::service::unix_now();

    let tokens = issuer.issue(&user, now).await.unwrap();
    assert_eq!(tokens.access_credential.expires, now + 1_800);
    assert_eq!(tokens.refresh_credential.expires, now + 3_600);

    let session = issuer
        .authorize(&tokens.access_credential.token, now)
        .await
        .unwrap();
    assert_eq!(session.user_id, user.id);

    issuer.revoke(&tokens.refresh_credential.token).await.unwrap();
    assert!(matches!(
        issuer.authorize(&tokens.access_credential.token, now).await,
        Err(SessionError::InvalidCredential)
    ));
    assert!(matches!(
        issuer.revoke(&tokens.refresh_credential.token).await,
        Err(SessionError::UnknownCredential)
    ));
}

#[tokio::test]
async fn test_session_redeem_blacklists() {
    let Some(con) = connect().await else { return };
    let issuer = RedisSessionIssuer::new(con, 1_800, 3_600);
    let user = test_user(&unique_address());
    let now = walletgate::auth::service::unix_now();

    let tokens = issuer.issue(&user, now).await.unwrap();
    let user_id = issuer
        .redeem(&tokens.refresh_credential.token, now)
        .await
        .unwrap();
    assert_eq!(user_id, user.id);

    // Replay is refused and the paired access token is gone
    assert!(matches!(
        issuer.redeem(&tokens.refresh_credential.token, now).await,
        Err(SessionError::InvalidCredential)
    ));
    assert!(issuer
        .authorize(&tokens.access_credential.token, now)
        .await
        .is_err());

    // A blacklisted credential cannot be logged out either
    assert!(matches!(
        issuer.revoke(&tokens.refresh_credential.token).await,
        Err(SessionError::UnknownCredential)
    ));
}

// ============================================================================
// Service Over Redis
// ============================================================================

#[tokio::test]
async fn test_service_login_over_redis() {
    let Some(con) = connect().await else { return };
    let auth = AuthService::new(
        Arc::new(RedisChallengeStore::new(con.clone(), 120, 600)),
        Arc::new(RedisUserStore::new(con.clone())),
        Arc::new(RedisSessionIssuer::new(con, 1_800, 3_600)),
        "unnamed",
    );

    let mut seed = [0u8; 32];
    rand::fill(&mut seed);
    let secret = secp256k1::SecretKey::from_slice(&seed).unwrap();
    let public = secp256k1::PublicKey::from_secret_key(&secp256k1::Secp256k1::new(), &secret);
    let address = walletgate::auth::address::address_from_public_key(&public);
    let token = unique("lst");

    let nonce = auth.start_session(&token, &address).await.unwrap();
    let signature = walletgate::auth::sign_challenge(&secret, &nonce);
    assert!(auth.authenticate(&token, &signature).await.unwrap());

    let outcome = auth.login(&token).await.unwrap();
    assert_eq!(outcome.user.address, address);
    assert!(matches!(
        auth.login(&token).await,
        Err(AuthError::NotFoundOrExpired)
    ));

    let view = auth
        .current_user(&outcome.tokens.access_credential.token)
        .await
        .unwrap();
    assert_eq!(view.id, outcome.user.id);
}
