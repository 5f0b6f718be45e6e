//! # Resource Registry
//!
//! Resource kinds the controller talks to, constructed once at startup and handed to
//! the components that need them.

use super::GardenerCluster;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::{ApiResource, GroupVersionKind};
use kube::CustomResourceExt;

/// Known external resource kinds
#[derive(Debug, Clone)]
pub struct Registry {
    shoot: ApiResource,
    admin_kubeconfig_subresource: &'static str,
    admin_kubeconfig_request_api_version: &'static str,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let gvk = GroupVersionKind::gvk("core.gardener.cncf.io", "v1beta1", "Shoot");
        Self {
            shoot: ApiResource::from_gvk(&gvk),
            admin_kubeconfig_subresource: "adminkubeconfig",
            admin_kubeconfig_request_api_version: "authentication.gardener.cloud/v1alpha1",
        }
    }

    /// Gardener `Shoot` resource
    pub fn shoot(&self) -> &ApiResource {
        &self.shoot
    }

    /// Shoot subresource issuing admin kubeconfigs
    pub fn admin_kubeconfig_subresource(&self) -> &'static str {
        self.admin_kubeconfig_subresource
    }

    /// apiVersion of the `AdminKubeconfigRequest` body
    pub fn admin_kubeconfig_request_api_version(&self) -> &'static str {
        self.admin_kubeconfig_request_api_version
    }

    /// CRD served by this controller
    pub fn gardener_cluster_crd(&self) -> CustomResourceDefinition {
        GardenerCluster::crd()
    }
}
