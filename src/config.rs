use std::env;
use std::net::SocketAddr;

#[derive(Clone)]
pub struct Config {
    // Redis
    pub redis_url: String,

    // Server
    pub bind_addr: SocketAddr,

    // Limits
    pub max_body_bytes: usize,

    // TTLs (in seconds)
    pub challenge_ttl_secs: u64,
    pub challenge_retention_secs: u64,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,

    // Provisioning
    pub default_user_name: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("bind_addr", &self.bind_addr)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("challenge_ttl_secs", &self.challenge_ttl_secs)
            .field("challenge_retention_secs", &self.challenge_retention_secs)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("default_user_name", &self.default_user_name)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        // Redis — required to prevent silent unauthenticated connections
        let redis_url =
            env::var("REDIS_URL").map_err(|_| ConfigError::MissingVar("REDIS_URL".to_string()))?;

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;

        // Limits
        let max_body_bytes = parse_env_or_default("MAX_BODY_BYTES", 16_384)?;

        // TTLs
        let challenge_ttl_secs = parse_positive_or_default("CHALLENGE_TTL_SECS", 120)?;

        let challenge_retention_secs = parse_env_or_default("CHALLENGE_RETENTION_SECS", 86_400)?;
        if challenge_retention_secs < challenge_ttl_secs {
            return Err(ConfigError::InvalidValue(
                "CHALLENGE_RETENTION_SECS".to_string(),
                format!("must be at least CHALLENGE_TTL_SECS ({})", challenge_ttl_secs),
            ));
        }

        let access_ttl_secs = parse_positive_or_default("ACCESS_TTL_SECS", 1_800)?;
        let refresh_ttl_secs = parse_positive_or_default("REFRESH_TTL_SECS", 2_592_000)?;

        // Provisioning
        let default_user_name =
            env::var("DEFAULT_USER_NAME").unwrap_or_else(|_| "unnamed".to_string());
        if default_user_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "DEFAULT_USER_NAME".to_string(),
                "cannot be empty".to_string(),
            ));
        }

        Ok(Config {
            redis_url,
            bind_addr,
            max_body_bytes,
            challenge_ttl_secs,
            challenge_retention_secs,
            access_ttl_secs,
            refresh_ttl_secs,
            default_user_name,
        })
    }
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}

/// Like [`parse_env_or_default`], rejecting 0. Used for Redis expiries.
fn parse_positive_or_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = parse_env_or_default(key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than 0".to_string(),
        ));
    }
    Ok(value)
}
