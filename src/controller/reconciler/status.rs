//! # Status Updates
//!
//! Persists the outcome of a pass onto the GardenerCluster.
//!
//! The status is written on every pass. Status writes do not change the generation,
//! and the watch in `runtime::watch_loop` only lets generation or annotation changes
//! through, so writing here never schedules another pass.

use crate::constants::{FIELD_MANAGER, FORCE_ROTATION_ANNOTATION};
use crate::controller::reconciler::engine::PassReport;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{ConditionReason, GardenerCluster};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Run `call` against the API server, giving up after `timeout`
pub async fn with_deadline<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, ReconcilerError>
where
    F: Future<Output = Result<T, ReconcilerError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(ReconcilerError::Timeout { operation, timeout }))
}

/// Whether the pass served a forced rotation request on `cluster`
///
/// Creating the first secret serves the request just as a rotation does. Leaving the
/// annotation behind after a create would rotate the brand-new credential on the
/// next pass.
pub fn served_force_rotation(cluster: &GardenerCluster, report: &PassReport) -> bool {
    cluster.force_rotation_requested()
        && matches!(
            report.reason,
            ConditionReason::KubeconfigSecretCreated | ConditionReason::KubeconfigSecretRotated
        )
}

/// Merge patch carrying the status computed by the pass
pub fn status_patch(report: &PassReport) -> serde_json::Value {
    serde_json::json!({
        "status": report.status
    })
}

/// Patch the status subresource with the outcome of `report`
///
/// A GardenerCluster deleted during the pass is not an error.
pub async fn update_status(
    client: &Client,
    cluster: &GardenerCluster,
    report: &PassReport,
    timeout: Duration,
) -> Result<(), ReconcilerError> {
    let name = cluster.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = cluster.metadata.namespace.as_deref().unwrap_or("default");

    let api: Api<GardenerCluster> = Api::namespaced(client.clone(), namespace);
    let patch = status_patch(report);

    with_deadline("status update", timeout, async {
        match api
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!(
                    "GardenerCluster {}/{} was deleted during reconciliation, skipping status update",
                    namespace, name
                );
                Ok(())
            }
            Err(e) => Err(ReconcilerError::StatusUpdate(e)),
        }
    })
    .await
}

/// Remove the forced rotation annotation once the request was served
pub async fn clear_force_rotation(
    client: &Client,
    cluster: &GardenerCluster,
    timeout: Duration,
) -> Result<(), ReconcilerError> {
    let name = cluster.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = cluster.metadata.namespace.as_deref().unwrap_or("default");
    let api: Api<GardenerCluster> = Api::namespaced(client.clone(), namespace);
    let patch = serde_json::json!({
        "metadata": {
            "annotations": {
                FORCE_ROTATION_ANNOTATION: null
            }
        }
    });

    with_deadline("forced rotation cleanup", timeout, async {
        match api
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(ReconcilerError::Kube(e)),
        }
    })
    .await
}
