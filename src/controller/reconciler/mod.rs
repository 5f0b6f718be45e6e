//! # Reconciler
//!
//! Glue between the kube-runtime controller and the [`ReconciliationEngine`].
//!
//! `reconcile` runs one pass, persists its status, clears a served forced-rotation
//! request and maps the pass requeue onto a controller [`Action`]. Failed passes are
//! returned as errors so `error_policy` can apply the per-resource backoff.

pub mod engine;
pub mod status;

pub use engine::{EngineConfig, PassReport, PassState, ReconciliationEngine, Requeue};

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::policy;
use crate::crd::{ConditionReason, GardenerCluster};
use crate::observability::metrics;
use kube::Client;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};

/// Shortest requeue handed to the scheduler
const MIN_REQUEUE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// The pass failed and recorded `reason` on the resource
    #[error("{reason}: {message}")]
    Pass {
        reason: ConditionReason,
        message: String,
    },
    #[error("failed to update GardenerCluster status: {0}")]
    StatusUpdate(#[source] kube::Error),
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

/// Per-resource backoff state
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

/// Shared controller context
pub struct Reconciler {
    pub client: Client,
    pub engine: ReconciliationEngine,
    pub config: ControllerConfig,
    /// Keyed by `namespace/name`
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(client: Client, engine: ReconciliationEngine, config: ControllerConfig) -> Self {
        Self {
            client,
            engine,
            config,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Forget the failure history of `resource_key`
    pub fn reset_backoff(&self, resource_key: &str) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                if states.remove(resource_key).is_some() {
                    debug!("Reset backoff for {}", resource_key);
                }
            }
            Err(e) => warn!("Failed to lock backoff_states: {}", e),
        }
    }
}

/// Reconcile one GardenerCluster
pub async fn reconcile(
    cluster: Arc<GardenerCluster>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = cluster.metadata.name.clone().unwrap_or_default();
    let namespace = cluster.metadata.namespace.clone().unwrap_or_default();
    let span = tracing::info_span!(
        "controller.reconcile",
        resource.name = %name,
        resource.namespace = %namespace,
        shoot = %cluster.spec.shoot.name,
    );

    async move {
        let started = Instant::now();
        metrics::increment_reconciliations();

        let report = ctx.engine.run_pass(&cluster, chrono::Utc::now()).await;
        metrics::increment_pass_outcome(report.reason.as_str());
        if report.wrote_secret {
            metrics::increment_kubeconfigs_issued(report.reason.as_str());
        }

        let call_timeout = ctx.config.call_timeout;
        status::update_status(&ctx.client, &cluster, &report, call_timeout).await?;

        if status::served_force_rotation(&cluster, &report) {
            status::clear_force_rotation(&ctx.client, &cluster, call_timeout).await?;
            info!("Cleared forced rotation request for {}", cluster.resource_key());
        }

        metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());

        match report.requeue {
            Requeue::After(delay) => {
                ctx.reset_backoff(&cluster.resource_key());
                let delay = delay.max(MIN_REQUEUE);
                debug!("Next reconciliation in {}s", delay.as_secs());
                metrics::increment_requeues_total(requeue_reason(&report));
                Ok(Action::requeue(delay))
            }
            Requeue::Backoff => Err(ReconcilerError::Pass {
                reason: report.reason,
                message: report.failure.unwrap_or_default(),
            }),
        }
    }
    .instrument(span)
    .await
}

fn requeue_reason(report: &PassReport) -> &'static str {
    match report.decision {
        Some(policy::Action::NoActionNeeded(_)) => "next-check",
        _ => "rotation-due",
    }
}
