//! Prints the GardenerCluster CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/gardenercluster.yaml
//! ```

use anyhow::{Context, Result};
use gardener_kubeconfig_controller::crd::Registry;

fn main() -> Result<()> {
    let crd = Registry::new().gardener_cluster_crd();
    let yaml = serde_yaml::to_string(&crd).context("Failed to serialize CRD")?;
    print!("{yaml}");
    Ok(())
}
