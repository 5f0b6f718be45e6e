//! # Error Policy
//!
//! Backoff for failed reconciliations.

use crate::constants;
use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::crd::GardenerCluster;
use crate::observability::metrics;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Requeue a failed GardenerCluster with its own Fibonacci backoff
///
/// Backoff state is tracked per resource so failures of one resource never delay
/// another.
pub fn handle_reconciliation_error(
    cluster: Arc<GardenerCluster>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = cluster.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = cluster.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {}", namespace, name, error);
    metrics::increment_reconciliation_errors();

    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(cluster.resource_key()).or_insert_with(|| {
                BackoffState::new(ctx.config.backoff_min_secs, ctx.config.backoff_max_secs)
            });
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            (constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, 0)
        }
    };

    info!(
        "Retrying {}/{} in {}s (error count: {})",
        namespace, name, backoff_seconds, error_count
    );

    metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}
