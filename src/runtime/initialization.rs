//! # Initialization
//!
//! Controller startup: rustls setup, tracing, configuration, metrics, server startup
//! and client setup for both the runtime cluster and Gardener.

use crate::config::{load_config, ServerConfig};
use crate::controller::reconciler::{EngineConfig, ReconciliationEngine, Reconciler};
use crate::controller::server::{start_server, ServerState};
use crate::crd::{GardenerCluster, Registry};
use crate::observability;
use crate::provider::gardener::GardenerIssuer;
use crate::provider::kubernetes::KubeSecretStore;
use anyhow::{Context, Result};
use kube::{api::Api, Client};
use std::sync::Arc;
use tracing::{error, info};

/// Everything the watch loop needs
pub struct InitializationResult {
    /// Client of the cluster holding GardenerCluster resources and secrets
    pub client: Client,
    /// API for the GardenerCluster CRD across all namespaces
    pub clusters: Api<GardenerCluster>,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
}

/// Initialize the controller runtime
///
/// Handles, in order: rustls crypto provider, tracing subscriber, configuration,
/// metrics registration, HTTP server startup, Kubernetes and Gardener clients, and
/// the reconciler context.
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before any client is built; rustls 0.23 has no implicit provider.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        return Err(anyhow::anyhow!("Failed to install rustls crypto provider"));
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gardener_kubeconfig_controller=info".into()),
        )
        .init();

    info!(
        "Starting Gardener Kubeconfig Controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let (controller_config, server_config) = load_config().context("Invalid configuration")?;
    info!(
        project = %controller_config.gardener_project_name,
        validity_secs = controller_config.kubeconfig_validity.as_secs(),
        rotation_threshold_fraction = controller_config.rotation_threshold_fraction,
        "Configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = server_state.clone();
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {:#}", e);
        }
    });
    wait_for_server_ready(&server_config, &server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let clusters: Api<GardenerCluster> = Api::all(client.clone());

    let issuer = GardenerIssuer::from_kubeconfig_path(
        &controller_config.gardener_kubeconfig_path,
        Registry::new(),
    )
    .await?;
    let engine = ReconciliationEngine::new(
        Arc::new(KubeSecretStore::new(client.clone())),
        Arc::new(issuer),
        EngineConfig::from(&controller_config),
    );
    let reconciler = Arc::new(Reconciler::new(client.clone(), engine, controller_config));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        clusters,
        reconciler,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    config: &ServerConfig,
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = std::time::Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = std::time::Duration::from_millis(config.poll_interval_ms);
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}
