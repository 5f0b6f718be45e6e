//! # GCCTL CLI
//!
//! Command-line interface for the Gardener Kubeconfig Controller.
//!
//! ## Usage
//!
//! ```bash
//! # List GardenerCluster resources
//! gcctl list
//!
//! # Show status of a GardenerCluster and its kubeconfig secret
//! gcctl status --namespace kcp-system --name runtime-a
//!
//! # Rotate the kubeconfig on the next pass
//! gcctl rotate --namespace kcp-system --name runtime-a
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gardener_kubeconfig_controller::constants::{
    FORCE_ROTATION_ANNOTATION, LAST_SYNC_ANNOTATION, VALIDITY_ANNOTATION,
};
use gardener_kubeconfig_controller::crd::{ConditionType, GardenerCluster};
use k8s_openapi::api::core::v1::Secret;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    Client,
};
use serde_json::json;

/// Gardener Kubeconfig Controller CLI
#[derive(Parser)]
#[command(name = "gcctl")]
#[command(about = "Gardener Kubeconfig Controller CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to "default", or all namespaces for list)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List GardenerCluster resources
    List,
    /// Show status of a GardenerCluster resource
    Status {
        /// Name of the GardenerCluster resource
        #[arg(long)]
        name: String,
    },
    /// Request an immediate kubeconfig rotation
    Rotate {
        /// Name of the GardenerCluster resource
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gcctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::List => list_command(client, cli.namespace).await,
        Commands::Status { name } => status_command(client, name, cli.namespace).await,
        Commands::Rotate { name } => rotate_command(client, name, cli.namespace).await,
    }
}

/// List GardenerCluster resources with their state
async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<GardenerCluster> = match namespace {
        Some(ref ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    let clusters = api
        .list(&ListParams::default())
        .await
        .context("Failed to list GardenerCluster resources")?;

    if clusters.items.is_empty() {
        println!("No GardenerCluster resources found.");
        return Ok(());
    }

    println!(
        "{:<30} {:<20} {:<20} {:<8} {:<28}",
        "NAME", "NAMESPACE", "SHOOT", "STATE", "REASON"
    );
    println!("{}", "-".repeat(106));

    for cluster in clusters.items {
        let name = cluster.metadata.name.as_deref().unwrap_or("<unknown>");
        let ns = cluster.metadata.namespace.as_deref().unwrap_or("<unknown>");
        let state = cluster
            .status
            .as_ref()
            .and_then(|s| s.state)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let reason = cluster
            .status
            .as_ref()
            .and_then(|s| s.management_reason())
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<30} {:<20} {:<20} {:<8} {:<28}",
            name, ns, cluster.spec.shoot.name, state, reason
        );
    }

    Ok(())
}

/// Show the condition of a GardenerCluster and the issuance record of its secret
async fn status_command(client: Client, name: String, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let api: Api<GardenerCluster> = Api::namespaced(client.clone(), ns);

    let cluster = api
        .get(&name)
        .await
        .with_context(|| format!("Failed to get GardenerCluster '{ns}/{name}'"))?;

    println!("GardenerCluster '{ns}/{name}':\n");
    println!("Spec:");
    println!("  Shoot: {}", cluster.spec.shoot.name);
    let secret_ref = &cluster.spec.kubeconfig.secret;
    println!(
        "  Secret: {}/{} (key '{}')",
        secret_ref.namespace, secret_ref.name, secret_ref.key
    );
    if cluster.force_rotation_requested() {
        println!("  Forced rotation: pending");
    }

    match cluster.status {
        Some(ref status) => {
            println!("\nStatus:");
            if let Some(state) = status.state {
                println!("  State: {state}");
            }
            if let Some(condition) = status.conditions.get(ConditionType::KubeconfigManagement) {
                println!("  KubeconfigManagement: {:?}", condition.status);
                println!("    Reason: {}", condition.reason);
                println!("    Message: {}", condition.message);
                println!("    Last Transition: {}", condition.last_transition_time);
            }
        }
        None => println!("\nStatus: not reconciled yet"),
    }

    // Only metadata is printed; the kubeconfig itself never leaves the cluster.
    let secrets: Api<Secret> = Api::namespaced(client, &secret_ref.namespace);
    match secrets
        .get_opt(&secret_ref.name)
        .await
        .with_context(|| format!("Failed to read secret '{}'", secret_ref.name))?
    {
        Some(secret) => {
            let annotations = secret.metadata.annotations.unwrap_or_default();
            println!("\nSecret:");
            println!(
                "  Issued at: {}",
                annotations.get(LAST_SYNC_ANNOTATION).map_or("-", String::as_str)
            );
            println!(
                "  Validity (s): {}",
                annotations.get(VALIDITY_ANNOTATION).map_or("-", String::as_str)
            );
            println!(
                "  Resource version: {}",
                secret.metadata.resource_version.as_deref().unwrap_or("-")
            );
        }
        None => println!("\nSecret: not created yet"),
    }

    Ok(())
}

/// Annotate a GardenerCluster so the controller rotates its kubeconfig now
async fn rotate_command(client: Client, name: String, namespace: Option<String>) -> Result<()> {
    let ns = namespace.as_deref().unwrap_or("default");
    let api: Api<GardenerCluster> = Api::namespaced(client, ns);

    let patch = json!({
        "metadata": {
            "annotations": {
                FORCE_ROTATION_ANNOTATION: "true"
            }
        }
    });

    api.patch(&name, &PatchParams::apply("gcctl"), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to request rotation for '{ns}/{name}'"))?;

    println!("Rotation requested for GardenerCluster '{ns}/{name}'");
    println!("The controller rotates the kubeconfig on its next pass and removes the annotation.");

    Ok(())
}
