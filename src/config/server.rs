//! # Server Configuration
//!
//! HTTP server settings loaded from environment variables.

use super::{env_lookup, parse_var};
use crate::constants::{
    DEFAULT_METRICS_PORT, DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use anyhow::Result;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP server port for metrics and health probes
    pub metrics_port: u16,
    /// How long to wait for the server to be ready before giving up (seconds)
    pub startup_timeout_secs: u64,
    /// How often to check if the server is ready during startup (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but not a valid number.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_lookup)
    }

    pub(crate) fn from_lookup<L: Fn(&str) -> Option<String>>(lookup: &L) -> Result<Self> {
        Ok(Self {
            metrics_port: parse_var(lookup, "METRICS_PORT", DEFAULT_METRICS_PORT)?,
            startup_timeout_secs: parse_var(
                lookup,
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            )?,
            poll_interval_ms: parse_var(
                lookup,
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            )?,
        })
    }
}
