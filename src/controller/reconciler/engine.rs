//! # Reconciliation Engine
//!
//! One reconcile pass for one GardenerCluster:
//!
//! ```text
//! Start -> Deciding -> [Issuing -> Persisting] -> Reporting -> Done
//!   \________\______________\__________\____________-> Failed
//! ```
//!
//! The engine reads fresh state on every pass and never trusts a previous outcome,
//! since passes for the same resource may run in any order relative to the events
//! that triggered them. Every pass ends with exactly one update of the
//! `KubeconfigManagement` condition.

use crate::config::ControllerConfig;
use crate::controller::policy::{self, Action};
use crate::crd::{
    ConditionReason, ConditionType, GardenerCluster, GardenerClusterStatus, SecretRef,
};
use crate::provider::{
    CredentialIssuer, CredentialStore, IssuanceRecord, IssuerError, StoreError, StoredCredential,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Settings a pass depends on
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub project_name: String,
    pub validity: Duration,
    pub rotation_threshold_fraction: f64,
    pub call_timeout: Duration,
}

impl From<&ControllerConfig> for EngineConfig {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            project_name: config.gardener_project_name.clone(),
            validity: config.kubeconfig_validity,
            rotation_threshold_fraction: config.rotation_threshold_fraction,
            call_timeout: config.call_timeout,
        }
    }
}

/// States of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Start,
    Deciding,
    Issuing,
    Persisting,
    Reporting,
    Done,
    Failed,
}

/// When the scheduler should look at the resource again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Success: re-check after the given delay
    After(Duration),
    /// Failure: retry with the per-resource backoff
    Backoff,
}

/// What a pass did and what it wants recorded
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Status to persist on the GardenerCluster
    pub status: GardenerClusterStatus,
    /// Reason recorded on the management condition
    pub reason: ConditionReason,
    /// Policy decision, absent when the pass failed before deciding
    pub decision: Option<Action>,
    pub requeue: Requeue,
    /// `Done` or `Failed`
    pub final_state: PassState,
    /// States visited, in order
    pub trace: Vec<PassState>,
    /// Whether the secret was created or replaced
    pub wrote_secret: bool,
    /// Text of the error that failed the pass
    pub failure: Option<String>,
}

struct Pass {
    status: GardenerClusterStatus,
    trace: Vec<PassState>,
    decision: Option<Action>,
    now: DateTime<Utc>,
}

impl Pass {
    fn enter(&mut self, state: PassState) {
        debug!(?state, "pass.transition");
        self.trace.push(state);
    }

    fn done(mut self, reason: ConditionReason, requeue: Duration, wrote_secret: bool) -> PassReport {
        self.enter(PassState::Reporting);
        self.status
            .set_ready(ConditionType::KubeconfigManagement, reason, self.now);
        self.enter(PassState::Done);
        PassReport {
            status: self.status,
            reason,
            decision: self.decision,
            requeue: Requeue::After(requeue),
            final_state: PassState::Done,
            trace: self.trace,
            wrote_secret,
            failure: None,
        }
    }

    fn fail(mut self, reason: ConditionReason, cause: &str) -> PassReport {
        self.enter(PassState::Failed);
        self.status
            .set_error(ConditionType::KubeconfigManagement, reason, cause, self.now);
        PassReport {
            status: self.status,
            reason,
            decision: self.decision,
            requeue: Requeue::Backoff,
            final_state: PassState::Failed,
            trace: self.trace,
            wrote_secret: false,
            failure: Some(cause.to_string()),
        }
    }
}

/// Orchestrates policy, issuer and store for one resource per call
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn CredentialStore>,
    issuer: Arc<dyn CredentialIssuer>,
    config: EngineConfig,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        issuer: Arc<dyn CredentialIssuer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            issuer,
            config,
        }
    }

    /// Run one pass for `cluster` as of `now`
    ///
    /// Never returns an error: failures are reported through [`PassReport`] so the
    /// caller can persist them before retrying.
    pub async fn run_pass(&self, cluster: &GardenerCluster, now: DateTime<Utc>) -> PassReport {
        let secret = &cluster.spec.kubeconfig.secret;
        let mut pass = Pass {
            status: cluster.status.clone().unwrap_or_default(),
            trace: Vec::new(),
            decision: None,
            now,
        };
        pass.enter(PassState::Start);

        let existing = match self.read(secret).await {
            Ok(stored) => Some(stored),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => {
                warn!("Failed to read kubeconfig secret {}/{}: {}", secret.namespace, secret.name, e);
                return pass.fail(ConditionReason::FailedToGetSecret, &e.to_string());
            }
        };

        pass.enter(PassState::Deciding);
        let mut action = policy::decide(
            now,
            self.config.validity,
            self.config.rotation_threshold_fraction,
            existing.as_ref(),
        );
        if existing.is_some() && cluster.force_rotation_requested() && action != Action::RotateNow {
            info!("Forced kubeconfig rotation requested for {}", cluster.resource_key());
            action = Action::RotateNow;
        }
        pass.decision = Some(action);
        debug!(?action, "policy.decision");

        let existing = match action {
            Action::NoActionNeeded(next_check_at) => {
                // Keep the reason of the last successful issuance.
                let reason = pass
                    .status
                    .management_reason()
                    .filter(|reason| !reason.is_failure())
                    .unwrap_or(ConditionReason::KubeconfigSecretUpToDate);
                let delay = (next_check_at - now).to_std().unwrap_or(Duration::ZERO);
                debug!(
                    "Kubeconfig for {} is fresh, next check at {}",
                    cluster.resource_key(),
                    next_check_at.to_rfc3339()
                );
                return pass.done(reason, delay, false);
            }
            Action::CreateNew => None,
            Action::RotateNow => existing,
        };

        pass.enter(PassState::Issuing);
        let shoot = &cluster.spec.shoot.name;
        let kubeconfig = match self
            .bounded(
                self.issuer
                    .issue(shoot, &self.config.project_name, self.config.validity),
                |timeout| IssuerError::IssuerUnavailable(format!("timed out after {timeout:?}")),
            )
            .await
        {
            Ok(kubeconfig) => kubeconfig,
            Err(e) => {
                warn!("Failed to get kubeconfig for shoot {}: {}", shoot, e);
                return pass.fail(ConditionReason::FailedToGetKubeconfig, &e.to_string());
            }
        };

        pass.enter(PassState::Persisting);
        let record = IssuanceRecord {
            issued_at: now,
            validity: self.config.validity,
            cluster_name: cluster.metadata.name.clone().unwrap_or_default(),
            cluster_namespace: cluster.metadata.namespace.clone().unwrap_or_default(),
            shoot_name: shoot.clone(),
        };
        let requeue = policy::rotation_delay(
            self.config.validity,
            self.config.rotation_threshold_fraction,
        );

        match existing {
            None => {
                if let Err(e) = self
                    .bounded(self.store.create(secret, &kubeconfig, &record), StoreError::Timeout)
                    .await
                {
                    warn!("Failed to create kubeconfig secret {}/{}: {}", secret.namespace, secret.name, e);
                    return pass.fail(ConditionReason::FailedToCreateSecret, &e.to_string());
                }
                info!(
                    "Created kubeconfig secret {}/{} for shoot {}",
                    secret.namespace, secret.name, shoot
                );
                pass.done(ConditionReason::KubeconfigSecretCreated, requeue, true)
            }
            Some(stored) => {
                if let Err(e) = self.update_retrying_conflict(secret, &kubeconfig, &record, &stored).await {
                    warn!("Failed to rotate kubeconfig secret {}/{}: {}", secret.namespace, secret.name, e);
                    return pass.fail(ConditionReason::FailedToUpdateSecret, &e.to_string());
                }
                info!(
                    "Rotated kubeconfig secret {}/{} for shoot {}",
                    secret.namespace, secret.name, shoot
                );
                pass.done(ConditionReason::KubeconfigSecretRotated, requeue, true)
            }
        }
    }

    /// Update the secret, re-reading and retrying once if it changed under us
    async fn update_retrying_conflict(
        &self,
        secret: &SecretRef,
        kubeconfig: &[u8],
        record: &IssuanceRecord,
        stored: &StoredCredential,
    ) -> Result<(), StoreError> {
        match self.update(secret, kubeconfig, record, stored.resource_version.as_deref()).await {
            Err(StoreError::Conflict(name)) => {
                warn!("Secret {} changed since it was read, retrying update once", name);
                let fresh = self.read(secret).await?;
                self.update(secret, kubeconfig, record, fresh.resource_version.as_deref())
                    .await
            }
            other => other,
        }
    }

    async fn read(&self, secret: &SecretRef) -> Result<StoredCredential, StoreError> {
        self.bounded(self.store.read(secret), StoreError::Timeout).await
    }

    async fn update(
        &self,
        secret: &SecretRef,
        kubeconfig: &[u8],
        record: &IssuanceRecord,
        resource_version: Option<&str>,
    ) -> Result<(), StoreError> {
        self.bounded(
            self.store.update(secret, kubeconfig, record, resource_version),
            StoreError::Timeout,
        )
        .await
    }

    /// Run `call` under the configured call timeout
    async fn bounded<T, E>(
        &self,
        call: impl Future<Output = Result<T, E>>,
        on_timeout: impl FnOnce(Duration) -> E,
    ) -> Result<T, E> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_elapsed) => Err(on_timeout(self.config.call_timeout)),
        }
    }
}
