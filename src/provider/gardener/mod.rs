//! # Gardener Issuer
//!
//! Issues admin kubeconfigs through the `shoots/adminkubeconfig` subresource:
//!
//! ```text
//! POST /apis/core.gardener.cncf.io/v1beta1/namespaces/garden-<project>/shoots/<shoot>/adminkubeconfig
//! ```
//!
//! The request body is an `AdminKubeconfigRequest` carrying `spec.expirationSeconds`;
//! the response returns the kubeconfig base64-encoded in `status.kubeconfig`.

use crate::crd::Registry;
use crate::provider::{CredentialIssuer, IssuerError, KubeconfigBytes};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use kube::api::{Api, DynamicObject, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use zeroize::Zeroizing;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminKubeconfigRequest {
    #[serde(default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    spec: AdminKubeconfigRequestSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<AdminKubeconfigRequestStatus>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminKubeconfigRequestSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiration_seconds: Option<u64>,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdminKubeconfigRequestStatus {
    #[serde(default)]
    kubeconfig: String,
    #[serde(default)]
    expiration_timestamp: Option<String>,
}

impl std::fmt::Debug for AdminKubeconfigRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminKubeconfigRequestStatus")
            .field("expiration_timestamp", &self.expiration_timestamp)
            .finish_non_exhaustive()
    }
}

/// [`CredentialIssuer`] backed by the Gardener API
#[derive(Clone)]
pub struct GardenerIssuer {
    client: Client,
    registry: Registry,
}

impl std::fmt::Debug for GardenerIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GardenerIssuer")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl GardenerIssuer {
    pub fn new(client: Client, registry: Registry) -> Self {
        Self { client, registry }
    }

    /// Build an issuer authenticating with the kubeconfig at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the kubeconfig cannot be read or yields no usable client.
    pub async fn from_kubeconfig_path(path: &Path, registry: Registry) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read Gardener kubeconfig {}", path.display()))?;
        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("Invalid Gardener kubeconfig")?;
        info!("Gardener API server: {}", config.cluster_url);
        let client = Client::try_from(config).context("Failed to create Gardener client")?;
        Ok(Self::new(client, registry))
    }
}

#[async_trait]
impl CredentialIssuer for GardenerIssuer {
    async fn issue(
        &self,
        shoot_name: &str,
        project_name: &str,
        validity: Duration,
    ) -> Result<KubeconfigBytes, IssuerError> {
        let namespace = format!("garden-{project_name}");
        let shoots: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &namespace, self.registry.shoot());

        let request = AdminKubeconfigRequest {
            api_version: self.registry.admin_kubeconfig_request_api_version().to_string(),
            kind: "AdminKubeconfigRequest".to_string(),
            spec: AdminKubeconfigRequestSpec {
                expiration_seconds: Some(validity.as_secs()),
            },
            status: None,
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| IssuerError::IssuerUnavailable(format!("failed to encode request: {e}")))?;

        debug!(
            shoot = shoot_name,
            namespace = %namespace,
            expiration_seconds = validity.as_secs(),
            "Requesting admin kubeconfig"
        );

        let response: AdminKubeconfigRequest = shoots
            .create_subresource(
                self.registry.admin_kubeconfig_subresource(),
                shoot_name,
                &PostParams::default(),
                body,
            )
            .await
            .map_err(|e| match e {
                kube::Error::Api(api_err) => {
                    issuer_error_from_status(api_err.code, &api_err.message, shoot_name, project_name)
                }
                other => IssuerError::IssuerUnavailable(other.to_string()),
            })?;

        decode_kubeconfig(response)
    }
}

/// Map a Gardener status code to an [`IssuerError`]
fn issuer_error_from_status(code: u16, message: &str, shoot: &str, project: &str) -> IssuerError {
    match code {
        404 => IssuerError::ShootNotFound {
            shoot: shoot.to_string(),
            project: project.to_string(),
        },
        401 | 403 => IssuerError::AuthDenied(format!("HTTP {code}: {message}")),
        _ => IssuerError::IssuerUnavailable(format!("HTTP {code}: {message}")),
    }
}

fn decode_kubeconfig(response: AdminKubeconfigRequest) -> Result<KubeconfigBytes, IssuerError> {
    let status = response.status.ok_or_else(|| {
        IssuerError::IssuerUnavailable("response carries no status".to_string())
    })?;
    let encoded = Zeroizing::new(status.kubeconfig);
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| IssuerError::IssuerUnavailable(format!("kubeconfig is not valid base64: {e}")))?;
    if decoded.is_empty() {
        return Err(IssuerError::IssuerUnavailable(
            "Gardener returned an empty kubeconfig".to_string(),
        ));
    }
    Ok(Zeroizing::new(decoded))
}
