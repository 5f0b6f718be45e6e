use anyhow::Result;
use gardener_kubeconfig_controller::runtime::{initialize, run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;

    run_watch_loop(
        init_result.clusters,
        init_result.reconciler,
        init_result.server_state,
    )
    .await
}
