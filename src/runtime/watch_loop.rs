//! # Watch Loop
//!
//! Runs the kube-runtime controller for GardenerCluster resources.
//!
//! The controller serializes passes per resource and runs up to
//! `RECONCILE_CONCURRENCY` distinct resources at once. GardenerCluster events only
//! start a pass when the generation or the annotations changed, so the status
//! written at the end of each pass does not trigger the next one. Managed secrets
//! are watched too, so deleting or editing one re-triggers its owner right away
//! instead of at the next scheduled check.

use crate::constants::{CLUSTER_NAMESPACE_KEY, CLUSTER_NAME_KEY, FIELD_MANAGER, MANAGED_BY_LABEL};
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::GardenerCluster;
use crate::runtime::error_policy::handle_reconciliation_error;
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube_runtime::controller::{Config as ControllerRuntimeConfig, Controller};
use kube_runtime::reflector::{self, ObjectRef};
use kube_runtime::{predicates, watcher, Predicate, WatchStreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// GardenerCluster owning a managed secret, from the secret's owner annotations
pub fn owner_of(secret: &Secret) -> Option<ObjectRef<GardenerCluster>> {
    let annotations = secret.metadata.annotations.as_ref()?;
    let name = annotations.get(CLUSTER_NAME_KEY)?;
    let namespace = annotations.get(CLUSTER_NAMESPACE_KEY)?;
    Some(ObjectRef::new(name).within(namespace))
}

/// Changes of a GardenerCluster that start a pass
///
/// Status writes change neither the generation nor the annotations. Setting or
/// clearing the forced rotation annotation does.
pub fn cluster_change_predicate() -> impl Predicate<GardenerCluster> {
    predicates::generation.combine(predicates::annotations)
}

/// Run the controller until a termination signal arrives
pub async fn run_watch_loop(
    clusters: Api<GardenerCluster>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let secrets: Api<Secret> = Api::all(reconciler.client.clone());
    let managed_secrets =
        watcher::Config::default().labels(&format!("{MANAGED_BY_LABEL}={FIELD_MANAGER}"));
    let concurrency = reconciler.config.reconcile_concurrency;

    let (reader, writer) = reflector::store();
    let cluster_changes = watcher(clusters, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .predicate_filter(cluster_change_predicate());

    info!(concurrency, "Watching GardenerCluster resources in all namespaces");

    Controller::for_stream(cluster_changes, reader)
        .watches(secrets, managed_secrets, |secret| owner_of(&secret))
        .with_config(ControllerRuntimeConfig::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!(resource = %obj, ?action, "reconcile.completed");
                }
                Err(e) => {
                    warn!("Controller reported an error: {}", e);
                }
            }
        })
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller shut down");
    Ok(())
}
