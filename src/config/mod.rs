//! # Controller Configuration
//!
//! Process-level configuration loaded from environment variables (populated from a ConfigMap
//! or the Deployment spec).
//!
//! All configuration has sensible defaults and can be overridden via environment variables.
//! A variable that is set but cannot be parsed is an error, never a silent default.

mod controller;
mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

use anyhow::{Context, Result};
use std::str::FromStr;

/// Load configuration from environment variables with defaults
///
/// # Errors
///
/// Returns an error if a variable is present but invalid.
pub fn load_config() -> Result<(ControllerConfig, ServerConfig)> {
    Ok((ControllerConfig::from_env()?, ServerConfig::from_env()?))
}

/// Value of `key` from the process environment
pub(crate) fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Parse variable `key` via `lookup`, or return `default` when it is unset
pub(crate) fn parse_var<T, L>(lookup: &L, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}
