use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use types::policy::MatchPolicy;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_LOG_FILTER: &str = "info,tower_http=info";
const DEFAULT_WINDOW_SECONDS: u64 = 3 * 60 * 60;
const DEFAULT_MESSAGE_QUOTA: u32 = 3;
const DEFAULT_RETENTION_SECONDS: u64 = 0;
const DEFAULT_REQUIRE_CO_LOCATION: bool = true;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60 * 60;
const DEFAULT_SWEEP_CLEAN: bool = false;
const DEFAULT_LIKE_LIMIT: u32 = 30;
const DEFAULT_LIKE_WINDOW_SECONDS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub log_filter: String,
    pub policy: MatchPolicy,
    pub sweep_interval: Duration,
    pub sweep_clean: bool,
    pub like_limit: u32,
    pub like_window: Duration,
    pub auth_secret: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid MATCH_GATEWAY_BIND_ADDR value '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid {name} value '{value}'")]
    InvalidNumber { name: &'static str, value: String },
    #[error("MATCH_AUTH_SECRET must be set")]
    MissingAuthSecret,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr_raw = env::var("MATCH_GATEWAY_BIND_ADDR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        let bind_addr = bind_addr_raw
            .parse()
            .map_err(|source| ConfigError::InvalidBindAddr {
                value: bind_addr_raw,
                source,
            })?;

        let log_filter = env::var("MATCH_GATEWAY_LOG_FILTER")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        let window_seconds = positive_u64("MATCH_WINDOW_SECONDS", DEFAULT_WINDOW_SECONDS)?;
        let message_quota = positive_u64("MATCH_MESSAGE_QUOTA", u64::from(DEFAULT_MESSAGE_QUOTA))?;
        let retention_seconds = env_u64("MATCH_RETENTION_SECONDS", DEFAULT_RETENTION_SECONDS)?;
        let require_co_location = env_bool("MATCH_REQUIRE_CO_LOCATION", DEFAULT_REQUIRE_CO_LOCATION);

        let sweep_interval_seconds =
            positive_u64("MATCH_SWEEP_INTERVAL_SECONDS", DEFAULT_SWEEP_INTERVAL_SECONDS)?;
        let sweep_clean = env_bool("MATCH_SWEEP_CLEAN", DEFAULT_SWEEP_CLEAN);

        let like_limit = positive_u64("MATCH_LIKE_LIMIT", u64::from(DEFAULT_LIKE_LIMIT))?;
        let like_window_seconds =
            positive_u64("MATCH_LIKE_WINDOW_SECONDS", DEFAULT_LIKE_WINDOW_SECONDS)?;

        let auth_secret = env::var("MATCH_AUTH_SECRET")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingAuthSecret)?;

        let policy = MatchPolicy {
            window_ms: seconds_to_ms("MATCH_WINDOW_SECONDS", window_seconds)?,
            message_quota: narrow("MATCH_MESSAGE_QUOTA", message_quota)?,
            retention_ms: seconds_to_ms("MATCH_RETENTION_SECONDS", retention_seconds)?,
            require_co_location,
            ..MatchPolicy::default()
        };

        Ok(Self {
            bind_addr,
            log_filter,
            policy,
            sweep_interval: Duration::from_secs(sweep_interval_seconds),
            sweep_clean,
            like_limit: narrow("MATCH_LIKE_LIMIT", like_limit)?,
            like_window: Duration::from_secs(like_window_seconds),
            auth_secret,
        })
    }
}

fn env_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name).ok().filter(|value| !value.trim().is_empty()) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}

fn positive_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value = env_u64(name, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn seconds_to_ms(name: &'static str, seconds: u64) -> Result<i64, ConfigError> {
    seconds
        .checked_mul(1_000)
        .and_then(|ms| i64::try_from(ms).ok())
        .ok_or_else(|| ConfigError::InvalidNumber {
            name,
            value: seconds.to_string(),
        })
}

fn narrow(name: &'static str, value: u64) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|_| ConfigError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}
