//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

const DEV_ACCESS_SECRET: &str = "enclave-dev-access-secret";
const DEV_REFRESH_SECRET: &str = "enclave-dev-refresh-secret";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Deployment environment. Development exposes internal error details and
/// tolerates missing JWT secrets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: Option<String>,
    pub log_level: Level,
    pub environment: Environment,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    pub terminal_idle_timeout: chrono::Duration,
    pub cors_origin: String,
    pub auth_rate_limit: u32,
    pub api_rate_limit: u32,
    pub rate_limit_window: Duration,
    pub seed_demo_data: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an explicit set of variables.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Storage ---
        let bind_address: SocketAddr = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let environment = match lookup("APP_ENV").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("development") | Some("dev") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "APP_ENV".to_string(),
                    format!("'{}' is not development or production", other),
                ))
            }
        };

        // --- Tokens ---
        let jwt_secret = secret(&lookup, "JWT_SECRET", environment, DEV_ACCESS_SECRET)?;
        let jwt_refresh_secret = secret(&lookup, "JWT_REFRESH_SECRET", environment, DEV_REFRESH_SECRET)?;
        if jwt_secret == jwt_refresh_secret {
            return Err(ConfigError::InvalidValue(
                "JWT_REFRESH_SECRET".to_string(),
                "must differ from JWT_SECRET".to_string(),
            ));
        }
        let jwt_issuer = lookup("JWT_ISSUER").unwrap_or_else(|| "enclave".to_string());
        let jwt_audience = lookup("JWT_AUDIENCE").unwrap_or_else(|| "enclave-terminal".to_string());

        let access_minutes: i64 = positive(&lookup, "ACCESS_TOKEN_TTL_MINUTES", 15)?;
        let refresh_days: i64 = positive(&lookup, "REFRESH_TOKEN_TTL_DAYS", 7)?;
        let idle_minutes: i64 = positive(&lookup, "TERMINAL_IDLE_TIMEOUT_MINUTES", 60)?;

        // --- HTTP Surface ---
        let cors_origin = lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());
        let auth_rate_limit: u32 = positive(&lookup, "AUTH_RATE_LIMIT", 10)?;
        let api_rate_limit: u32 = positive(&lookup, "API_RATE_LIMIT", 300)?;
        let window_seconds: u64 = positive(&lookup, "RATE_LIMIT_WINDOW_SECONDS", 900)?;
        let seed_demo_data = parse_or(&lookup, "SEED_DEMO_DATA", Some(true))?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            environment,
            jwt_secret,
            jwt_refresh_secret,
            jwt_issuer,
            jwt_audience,
            access_token_ttl: chrono::Duration::minutes(access_minutes),
            refresh_token_ttl: chrono::Duration::days(refresh_days),
            terminal_idle_timeout: chrono::Duration::minutes(idle_minutes),
            cors_origin,
            auth_rate_limit,
            api_rate_limit,
            rate_limit_window: Duration::from_secs(window_seconds),
            seed_demo_data,
        })
    }

    /// True when either JWT secret fell back to its built-in development value.
    pub fn uses_development_secrets(&self) -> bool {
        self.jwt_secret == DEV_ACCESS_SECRET || self.jwt_refresh_secret == DEV_REFRESH_SECRET
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}

fn positive<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value = parse_or(lookup, key, Some(default))?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

fn secret<F>(lookup: &F, key: &str, environment: Environment, fallback: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|s| !s.is_empty()) {
        Some(value) => Ok(value),
        None if environment.is_production() => Err(ConfigError::MissingVar(key.to_string())),
        None => Ok(fallback.to_string()),
    }
}
