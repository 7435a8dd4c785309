//! Environment variable names used by this crate for convenient
//! configuration of the sink from services.
//!
//! These are purely helpers; [`Timber`](crate::timber::Timber) itself stays
//! decoupled from environment access unless built with
//! [`Timber::from_env`](crate::timber::Timber::from_env).

use crate::error::ConfigError;
use std::str::FromStr;

/// Timber API key used as the bearer token for delivery.
pub const TIMBER_API_KEY_ENV: &str = "TIMBER_API_KEY";

/// Timber source id the entries are delivered to.
pub const TIMBER_SOURCE_ID_ENV: &str = "TIMBER_SOURCE_ID";

/// Optional ingestion base URL, e.g. `https://logs.timber.io`.
pub const TIMBER_ENDPOINT_ENV: &str = "TIMBER_ENDPOINT";

/// Optional maximum number of entries per delivered batch.
pub const TIMBER_BATCH_SIZE_ENV: &str = "TIMBER_BATCH_SIZE";

/// Optional flush interval in milliseconds.
pub const TIMBER_BATCH_INTERVAL_MS_ENV: &str = "TIMBER_BATCH_INTERVAL_MS";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read a required environment variable.
pub fn env_required(key: &'static str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(key)),
    }
}

/// Parse an optional environment variable, `Ok(None)` when unset.
pub fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(None),
    }
}
