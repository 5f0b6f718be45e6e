//! # Controller Settings
//!
//! Gardener access, kubeconfig validity and retry settings.

use super::{env_lookup, parse_var};
use crate::constants::*;
use crate::controller::validation::{parse_kubernetes_duration, validate_duration_interval};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Kubeconfig the controller uses to authenticate against Gardener
    pub gardener_kubeconfig_path: PathBuf,
    /// Gardener project; shoots live in namespace `garden-<project>`
    pub gardener_project_name: String,
    /// Validity requested for each issued kubeconfig
    pub kubeconfig_validity: Duration,
    /// Rotate once `remaining <= validity * fraction`
    pub rotation_threshold_fraction: f64,
    /// Lower bound of the per-resource Fibonacci backoff (seconds)
    pub backoff_min_secs: u64,
    /// Upper bound of the per-resource Fibonacci backoff (seconds)
    pub backoff_max_secs: u64,
    /// Deadline applied to each call to Gardener or the API server
    pub call_timeout: Duration,
    /// Maximum number of GardenerCluster resources reconciled concurrently
    pub reconcile_concurrency: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            gardener_kubeconfig_path: PathBuf::from(DEFAULT_GARDENER_KUBECONFIG_PATH),
            gardener_project_name: DEFAULT_GARDENER_PROJECT_NAME.to_string(),
            kubeconfig_validity: Duration::from_secs(DEFAULT_KUBECONFIG_VALIDITY_SECS),
            rotation_threshold_fraction: DEFAULT_ROTATION_THRESHOLD_FRACTION,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            reconcile_concurrency: DEFAULT_RECONCILE_CONCURRENCY,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed, or the
    /// resulting configuration fails [`ControllerConfig::validate`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&env_lookup)
    }

    pub(crate) fn from_lookup<L: Fn(&str) -> Option<String>>(lookup: &L) -> Result<Self> {
        let kubeconfig_validity = match lookup("KUBECONFIG_VALIDITY") {
            Some(raw) => {
                validate_duration_interval(&raw, "KUBECONFIG_VALIDITY", MIN_KUBECONFIG_VALIDITY_SECS)?;
                parse_kubernetes_duration(&raw).context("Invalid KUBECONFIG_VALIDITY")?
            }
            None => Duration::from_secs(DEFAULT_KUBECONFIG_VALIDITY_SECS),
        };

        let config = Self {
            gardener_kubeconfig_path: PathBuf::from(
                lookup("GARDENER_KUBECONFIG_PATH")
                    .unwrap_or_else(|| DEFAULT_GARDENER_KUBECONFIG_PATH.to_string()),
            ),
            gardener_project_name: lookup("GARDENER_PROJECT_NAME")
                .unwrap_or_else(|| DEFAULT_GARDENER_PROJECT_NAME.to_string()),
            kubeconfig_validity,
            rotation_threshold_fraction: parse_var(
                lookup,
                "ROTATION_THRESHOLD_FRACTION",
                DEFAULT_ROTATION_THRESHOLD_FRACTION,
            )?,
            backoff_min_secs: parse_var(lookup, "BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS)?,
            backoff_max_secs: parse_var(lookup, "BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS)?,
            call_timeout: Duration::from_secs(parse_var(
                lookup,
                "CALL_TIMEOUT_SECS",
                DEFAULT_CALL_TIMEOUT_SECS,
            )?),
            reconcile_concurrency: parse_var(
                lookup,
                "RECONCILE_CONCURRENCY",
                DEFAULT_RECONCILE_CONCURRENCY,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns an error if the threshold fraction is outside `(0, 1)`, the
    /// backoff bounds are inverted, or a timeout/project name is empty.
    pub fn validate(&self) -> Result<()> {
        if !(self.rotation_threshold_fraction > 0.0 && self.rotation_threshold_fraction < 1.0) {
            return Err(anyhow::anyhow!(
                "ROTATION_THRESHOLD_FRACTION must be in (0, 1), got {}",
                self.rotation_threshold_fraction
            ));
        }
        if self.backoff_min_secs == 0 || self.backoff_min_secs > self.backoff_max_secs {
            return Err(anyhow::anyhow!(
                "Backoff bounds must satisfy 0 < BACKOFF_MIN_SECS <= BACKOFF_MAX_SECS, got {}..{}",
                self.backoff_min_secs,
                self.backoff_max_secs
            ));
        }
        if self.call_timeout.is_zero() {
            return Err(anyhow::anyhow!("CALL_TIMEOUT_SECS must be greater than 0"));
        }
        if self.gardener_project_name.trim().is_empty() {
            return Err(anyhow::anyhow!("GARDENER_PROJECT_NAME cannot be empty"));
        }
        Ok(())
    }

    /// Gardener namespace holding the project's shoots
    pub fn gardener_namespace(&self) -> String {
        format!("garden-{}", self.gardener_project_name)
    }
}
