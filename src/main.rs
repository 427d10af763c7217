//! Walletgate application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Connect to Redis
//! 3. Wire the challenge, user, and session stores into the auth service
//! 4. Build router with API routes
//! 5. Apply security headers middleware
//! 6. Start Axum server
//!
//! Also supports `keygen` and `sign` subcommands for exercising the login
//! flow without a wallet.

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use walletgate::{
    auth::{address::address_from_public_key, sign_challenge, AppState, AuthService},
    config::Config,
    middleware::security_headers,
    routes,
    storage::{
        challenge::RedisChallengeStore, session::RedisSessionIssuer, user::RedisUserStore,
    },
};

/// Generate a secp256k1 keypair; returns (private key hex, address).
fn keygen() -> Result<(String, String), String> {
    let mut seed = [0u8; 32];
    rand::fill(&mut seed);
    let secret = SecretKey::from_slice(&seed).map_err(|e| format!("Secret key: {}", e))?;
    let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);

    Ok((
        hex::encode(secret.secret_bytes()),
        address_from_public_key(&public),
    ))
}

/// Sign a nonce with a hex private key, as the wallet would.
fn sign(secret_hex: &str, nonce: &str) -> Result<String, String> {
    let bytes = hex::decode(secret_hex.strip_prefix("0x").unwrap_or(secret_hex))
        .map_err(|e| format!("Private key hex: {}", e))?;
    let secret = SecretKey::from_slice(&bytes).map_err(|e| format!("Private key: {}", e))?;
    Ok(sign_challenge(&secret, nonce))
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  walletgate                       Start the server");
    eprintln!("  walletgate keygen                Print a new private key and its address");
    eprintln!("  walletgate sign <key> <nonce>    Sign a challenge nonce");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  walletgate sign 4c0883a6...e4f3 signin-0652c409-17ef-4ad6-b580-3faaefcc204d");
}

fn run_subcommand(args: &[String]) -> Result<(), String> {
    match args {
        [cmd] if cmd == "keygen" => {
            let (secret, address) = keygen()?;
            println!("private_key={}", secret);
            println!("address={}", address);
            Ok(())
        }
        [cmd, key, nonce] if cmd == "sign" => {
            println!("{}", sign(key, nonce)?);
            Ok(())
        }
        _ => {
            print_usage();
            Err("unknown or malformed subcommand".to_string())
        }
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        if let Err(e) = run_subcommand(&args) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config from environment
    let config = Config::from_env().expect("Failed to load config");
    tracing::info!("Starting walletgate on {}", config.bind_addr);

    // Connect to Redis
    let redis_client = redis::Client::open(config.redis_url.as_str()).expect("Invalid Redis URL");
    let con = redis_client
        .get_multiplexed_async_connection()
        .await
        .expect("Failed to connect to Redis");

    let auth = AuthService::new(
        Arc::new(RedisChallengeStore::new(
            con.clone(),
            config.challenge_ttl_secs,
            config.challenge_retention_secs,
        )),
        Arc::new(RedisUserStore::new(con.clone())),
        Arc::new(RedisSessionIssuer::new(
            con,
            config.access_ttl_secs,
            config.refresh_ttl_secs,
        )),
        config.default_user_name.clone(),
    );

    let state = AppState { auth };

    // Explicit CORS: deny all cross-origin requests (single-origin deployment).
    let cors = CorsLayer::new();

    let app = routes::api_router()
        .layer(axum::extract::DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors)
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
