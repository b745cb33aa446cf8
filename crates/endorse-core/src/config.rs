use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can drive it with a map.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("ENDORSE_ENV", "development"));

    let bind_addr: SocketAddr = parse_as(
        "ENDORSE_BIND_ADDR",
        &or_default("ENDORSE_BIND_ADDR", "0.0.0.0:3000"),
    )?;
    let log_level = or_default("ENDORSE_LOG_LEVEL", "info");

    let db_max_connections = parse_as(
        "ENDORSE_DB_MAX_CONNECTIONS",
        &or_default("ENDORSE_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections = parse_as(
        "ENDORSE_DB_MIN_CONNECTIONS",
        &or_default("ENDORSE_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs = parse_as(
        "ENDORSE_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("ENDORSE_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let storage_max_retries = parse_as(
        "ENDORSE_STORAGE_MAX_RETRIES",
        &or_default("ENDORSE_STORAGE_MAX_RETRIES", "3"),
    )?;
    let storage_retry_backoff_ms = parse_as(
        "ENDORSE_STORAGE_RETRY_BACKOFF_MS",
        &or_default("ENDORSE_STORAGE_RETRY_BACKOFF_MS", "100"),
    )?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        storage_max_retries,
        storage_retry_backoff_ms,
    })
}

fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}
