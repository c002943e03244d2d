//! Configuration module for the City Fix backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.
//! Invalid values are reported as [`AppError::Config`] and abort startup.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::AppError;
use crate::quota::QuotaPolicy;

/// Output format for the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret used to verify identity tokens
    pub jwt_secret: String,
    /// Expected `iss` claim, if any
    pub jwt_issuer: Option<String>,
    /// Expected `aud` claim, if any
    pub jwt_audience: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Maximum pooled database connections
    pub db_max_connections: u32,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Lowercase brand prefix of issued tracking ids
    pub tracking_prefix: String,
    /// Post limits per membership tier
    pub quota: QuotaPolicy,
    /// Upper bound for a whole request
    pub request_timeout: Duration,
    /// Upper bound for a single identity verification
    pub verify_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("CITYFIX_JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::Config("CITYFIX_JWT_SECRET must be set".to_string()))?;

        let jwt_issuer = env::var("CITYFIX_JWT_ISSUER").ok();
        let jwt_audience = env::var("CITYFIX_JWT_AUDIENCE").ok();

        let db_path = env::var("CITYFIX_DB_PATH")
            .unwrap_or_else(|_| "./data/cityfix.sqlite".to_string())
            .into();

        let index_path = env::var("CITYFIX_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = parse_var("CITYFIX_BIND_ADDR", "127.0.0.1:3000")?;
        let db_max_connections = parse_var("CITYFIX_DB_MAX_CONNECTIONS", "5")?;

        let log_level = env::var("CITYFIX_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("CITYFIX_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(other) => {
                return Err(AppError::Config(format!(
                    "CITYFIX_LOG_FORMAT must be 'pretty' or 'json', got '{}'",
                    other
                )))
            }
        };

        let tracking_prefix =
            env::var("CITYFIX_TRACKING_PREFIX").unwrap_or_else(|_| "cityfix".to_string());
        validate_tracking_prefix(&tracking_prefix)?;

        let quota = QuotaPolicy::new(
            parse_var("CITYFIX_FREE_POST_LIMIT", "5")?,
            parse_var("CITYFIX_STANDARD_POST_LIMIT", "50")?,
        )?;

        let request_timeout = parse_timeout("CITYFIX_REQUEST_TIMEOUT_SECS", "30")?;
        let verify_timeout = parse_timeout("CITYFIX_VERIFY_TIMEOUT_SECS", "5")?;

        Ok(Self {
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            db_path,
            db_max_connections,
            index_path,
            bind_addr,
            log_level,
            log_format,
            tracking_prefix,
            quota,
            request_timeout,
            verify_timeout,
        })
    }
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("Invalid {} value '{}'", name, raw)))
}

/// A zero timeout would fail every request, so it is rejected.
fn parse_timeout(name: &str, default: &str) -> Result<Duration, AppError> {
    match parse_var::<u64>(name, default)? {
        0 => Err(AppError::Config(format!("{} must be at least 1", name))),
        secs => Ok(Duration::from_secs(secs)),
    }
}

/// Tracking ids are matched by clients as `[a-z]+`, so the prefix must be too.
pub fn validate_tracking_prefix(prefix: &str) -> Result<(), AppError> {
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(AppError::Config(format!(
            "CITYFIX_TRACKING_PREFIX must be lowercase ASCII letters, got '{}'",
            prefix
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Membership;

    const VARS: &[&str] = &[
        "CITYFIX_JWT_SECRET",
        "CITYFIX_JWT_ISSUER",
        "CITYFIX_JWT_AUDIENCE",
        "CITYFIX_DB_PATH",
        "CITYFIX_INDEX_PATH",
        "CITYFIX_BIND_ADDR",
        "CITYFIX_DB_MAX_CONNECTIONS",
        "CITYFIX_LOG_LEVEL",
        "CITYFIX_LOG_FORMAT",
        "CITYFIX_TRACKING_PREFIX",
        "CITYFIX_FREE_POST_LIMIT",
        "CITYFIX_STANDARD_POST_LIMIT",
        "CITYFIX_REQUEST_TIMEOUT_SECS",
        "CITYFIX_VERIFY_TIMEOUT_SECS",
    ];

    // Environment mutation is process-wide, so everything runs in one test.
    #[test]
    fn test_config_from_env() {
        for var in VARS {
            env::remove_var(var);
        }

        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));

        env::set_var("CITYFIX_JWT_SECRET", "test-secret");
        let config = Config::from_env().unwrap();

        assert!(config.jwt_issuer.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/cityfix.sqlite"));
        assert_eq!(config.index_path, PathBuf::from("./data/index"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:3000");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.tracking_prefix, "cityfix");
        assert_eq!(config.quota.limit(Membership::Free), Some(5));
        assert_eq!(config.quota.limit(Membership::Standard), Some(50));
        assert_eq!(config.quota.limit(Membership::Premium), None);
        assert_eq!(config.request_timeout, Duration::from_secs(30));

        env::set_var("CITYFIX_FREE_POST_LIMIT", "zero");
        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
        env::remove_var("CITYFIX_FREE_POST_LIMIT");

        env::set_var("CITYFIX_REQUEST_TIMEOUT_SECS", "0");
        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
        env::remove_var("CITYFIX_REQUEST_TIMEOUT_SECS");

        env::set_var("CITYFIX_VERIFY_TIMEOUT_SECS", "0");
        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
        env::remove_var("CITYFIX_VERIFY_TIMEOUT_SECS");

        env::set_var("CITYFIX_TRACKING_PREFIX", "City-Fix");
        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
        env::remove_var("CITYFIX_TRACKING_PREFIX");

        env::set_var("CITYFIX_LOG_FORMAT", "xml");
        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));

        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_validate_tracking_prefix() {
        assert!(validate_tracking_prefix("cityfix").is_ok());
        assert!(validate_tracking_prefix("").is_err());
        assert!(validate_tracking_prefix("cf1").is_err());
        assert!(validate_tracking_prefix("CF").is_err());
    }
}
