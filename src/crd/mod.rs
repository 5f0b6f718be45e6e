//! # Custom Resource Definitions
//!
//! CRD types for the Gardener Kubeconfig Controller.
//!
//! `GardenerCluster` declares which Gardener shoot a kubeconfig should be issued for
//! and where the resulting Secret must live.

mod registry;
mod status;

pub use registry::Registry;
pub use status::*;

use crate::constants::FORCE_ROTATION_ANNOTATION;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// GardenerCluster Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: infrastructuremanager.kyma-project.io/v1
/// kind: GardenerCluster
/// metadata:
///   name: runtime-a
///   namespace: kcp-system
/// spec:
///   shoot:
///     name: c-1a2b3c
///   kubeconfig:
///     secret:
///       name: kubeconfig-runtime-a
///       namespace: kcp-system
///       key: config
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "GardenerCluster",
    group = "infrastructuremanager.kyma-project.io",
    version = "v1",
    namespaced,
    status = "GardenerClusterStatus",
    shortname = "gc",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}, {"name":"Shoot", "type":"string", "jsonPath":".spec.shoot.name"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GardenerClusterSpec {
    /// Desired location of the issued kubeconfig
    pub kubeconfig: Kubeconfig,
    /// Gardener shoot the kubeconfig grants access to
    pub shoot: Shoot,
}

/// Shoot defines the name of the Shoot resource
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Shoot {
    pub name: String,
}

/// Kubeconfig defines the desired kubeconfig location
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Kubeconfig {
    pub secret: SecretRef,
}

/// Location of the secret holding the kubeconfig, and the data key inside it
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
    pub namespace: String,
    pub key: String,
}

impl GardenerCluster {
    /// `namespace/name` key used for logging and per-resource backoff
    pub fn resource_key(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or("default"),
            self.metadata.name.as_deref().unwrap_or("unknown")
        )
    }

    /// Whether an operator requested an immediate rotation
    pub fn force_rotation_requested(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|ann| ann.get(FORCE_ROTATION_ANNOTATION))
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}
