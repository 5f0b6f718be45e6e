//! # Providers
//!
//! Seams between the reconciler and the outside world:
//!
//! - [`CredentialIssuer`]: requests time-limited admin kubeconfigs (Gardener)
//! - [`CredentialStore`]: reads and writes the Secret holding the kubeconfig (Kubernetes)
//!
//! The reconciler only depends on the traits, so passes can be exercised against
//! in-memory implementations.

pub mod gardener;
pub mod kubernetes;

use crate::crd::SecretRef;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

/// Kubeconfig bytes, wiped from memory on drop
pub type KubeconfigBytes = Zeroizing<Vec<u8>>;

/// Failures reported by a [`CredentialIssuer`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IssuerError {
    /// The shoot is unknown to Gardener
    #[error("shoot '{shoot}' not found in project '{project}'")]
    ShootNotFound { shoot: String, project: String },
    /// Gardener rejected the controller's own credentials
    #[error("access denied by Gardener: {0}")]
    AuthDenied(String),
    /// Transport failure, timeout or unusable response
    #[error("Gardener unavailable: {0}")]
    IssuerUnavailable(String),
}

/// Failures reported by a [`CredentialStore`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("secret '{0}' not found")]
    NotFound(String),
    #[error("secret '{0}' already exists")]
    AlreadyExists(String),
    /// The secret changed since it was read
    #[error("secret '{0}' was modified concurrently")]
    Conflict(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("API server request failed: {0}")]
    Api(String),
}

/// Who a stored kubeconfig was issued for, and when
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceRecord {
    pub issued_at: DateTime<Utc>,
    pub validity: Duration,
    /// Name of the owning GardenerCluster
    pub cluster_name: String,
    /// Namespace of the owning GardenerCluster
    pub cluster_namespace: String,
    pub shoot_name: String,
}

/// A kubeconfig secret as read from the store
#[derive(Clone, Default)]
pub struct StoredCredential {
    /// Payload under the configured key, `None` if the key is absent
    pub kubeconfig: Option<KubeconfigBytes>,
    /// Issuance time recorded at the last write
    pub issued_at: Option<DateTime<Utc>>,
    /// Validity recorded at the last write
    pub validity: Option<Duration>,
    /// Version used for optimistic concurrency on update
    pub resource_version: Option<String>,
}

impl std::fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredential")
            .field("kubeconfig", &self.kubeconfig.as_ref().map(|k| k.len()))
            .field("issued_at", &self.issued_at)
            .field("validity", &self.validity)
            .field("resource_version", &self.resource_version)
            .finish()
    }
}

/// Requests admin kubeconfigs for Gardener shoots
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    /// Issue a kubeconfig for `shoot_name` in `project_name`, valid for `validity`
    ///
    /// Implementations must not retry internally.
    async fn issue(
        &self,
        shoot_name: &str,
        project_name: &str,
        validity: Duration,
    ) -> Result<KubeconfigBytes, IssuerError>;
}

/// Reads and writes the Secret holding a kubeconfig
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the secret; [`StoreError::NotFound`] when it does not exist
    async fn read(&self, secret: &SecretRef) -> Result<StoredCredential, StoreError>;

    /// Create the secret; [`StoreError::AlreadyExists`] when it exists
    async fn create(
        &self,
        secret: &SecretRef,
        kubeconfig: &[u8],
        record: &IssuanceRecord,
    ) -> Result<(), StoreError>;

    /// Replace the kubeconfig of an existing secret
    ///
    /// Fails with [`StoreError::Conflict`] if the secret's version is no longer
    /// `resource_version`.
    async fn update(
        &self,
        secret: &SecretRef,
        kubeconfig: &[u8],
        record: &IssuanceRecord,
        resource_version: Option<&str>,
    ) -> Result<(), StoreError>;
}
