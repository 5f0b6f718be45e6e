//! # Kubernetes Secret Store
//!
//! Stores issued kubeconfigs in namespaced `Secret` resources.
//!
//! Freshness is recorded next to the payload as annotations, so the policy never
//! has to parse the kubeconfig itself:
//!
//! - `infrastructuremanager.kyma-project.io/last-sync`: RFC3339 issuance time
//! - `infrastructuremanager.kyma-project.io/validity`: validity in seconds
//!
//! Owner annotations tie the secret back to its GardenerCluster so secret events can
//! requeue it. The same keys are set as labels for selection where the value is a
//! valid label value; names longer than 63 characters only get the annotation.

use crate::constants::{
    CLUSTER_NAMESPACE_KEY, CLUSTER_NAME_KEY, FIELD_MANAGER, LAST_SYNC_ANNOTATION,
    MANAGED_BY_LABEL, MAX_LABEL_VALUE_LEN, SHOOT_NAME_KEY, VALIDITY_ANNOTATION,
};
use crate::crd::SecretRef;
use crate::provider::{CredentialStore, IssuanceRecord, StoreError, StoredCredential};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use zeroize::Zeroizing;

/// [`CredentialStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        }
    }
}

#[async_trait]
impl CredentialStore for KubeSecretStore {
    async fn read(&self, secret: &SecretRef) -> Result<StoredCredential, StoreError> {
        match self.api(&secret.namespace).get_opt(&secret.name).await {
            Ok(Some(found)) => Ok(stored_credential_from_secret(&found, &secret.key)),
            Ok(None) => Err(StoreError::NotFound(display_name(secret))),
            Err(e) => Err(store_error_from_kube(e, secret)),
        }
    }

    async fn create(
        &self,
        secret: &SecretRef,
        kubeconfig: &[u8],
        record: &IssuanceRecord,
    ) -> Result<(), StoreError> {
        let mut new_secret = Secret {
            metadata: ObjectMeta {
                name: Some(secret.name.clone()),
                namespace: Some(secret.namespace.clone()),
                ..ObjectMeta::default()
            },
            type_: Some("Opaque".to_string()),
            ..Secret::default()
        };
        apply_credential(&mut new_secret, &secret.key, kubeconfig, record);

        self.api(&secret.namespace)
            .create(&Self::post_params(), &new_secret)
            .await
            .map_err(|e| store_error_from_kube(e, secret))?;

        debug!("Created kubeconfig secret {}", display_name(secret));
        Ok(())
    }

    async fn update(
        &self,
        secret: &SecretRef,
        kubeconfig: &[u8],
        record: &IssuanceRecord,
        resource_version: Option<&str>,
    ) -> Result<(), StoreError> {
        let api = self.api(&secret.namespace);
        let mut current = api
            .get_opt(&secret.name)
            .await
            .map_err(|e| store_error_from_kube(e, secret))?
            .ok_or_else(|| StoreError::NotFound(display_name(secret)))?;

        // The replace below carries the version we just fetched; comparing it with the
        // version the caller decided on keeps changes made in between from being lost.
        if resource_version.is_some() && current.metadata.resource_version.as_deref() != resource_version {
            return Err(StoreError::Conflict(display_name(secret)));
        }

        apply_credential(&mut current, &secret.key, kubeconfig, record);

        api.replace(&secret.name, &Self::post_params(), &current)
            .await
            .map_err(|e| store_error_from_kube(e, secret))?;

        debug!("Updated kubeconfig secret {}", display_name(secret));
        Ok(())
    }
}

fn display_name(secret: &SecretRef) -> String {
    format!("{}/{}", secret.namespace, secret.name)
}

fn store_error_from_kube(error: kube::Error, secret: &SecretRef) -> StoreError {
    match error {
        kube::Error::Api(api_err) => store_error_from_status(api_err.code, &api_err.message, secret),
        other => StoreError::Api(other.to_string()),
    }
}

/// Map an API server status code to a [`StoreError`]
pub(crate) fn store_error_from_status(code: u16, message: &str, secret: &SecretRef) -> StoreError {
    match code {
        404 => StoreError::NotFound(display_name(secret)),
        // A 409 on create means the name is taken; on replace it means a stale resourceVersion.
        409 if message.contains("already exists") => StoreError::AlreadyExists(display_name(secret)),
        409 => StoreError::Conflict(display_name(secret)),
        _ => StoreError::Api(format!("HTTP {code}: {message}")),
    }
}

/// Extract payload and freshness record from a secret
pub(crate) fn stored_credential_from_secret(secret: &Secret, key: &str) -> StoredCredential {
    let annotations = secret.metadata.annotations.as_ref();

    let issued_at = annotations
        .and_then(|ann| ann.get(LAST_SYNC_ANNOTATION))
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let validity = annotations
        .and_then(|ann| ann.get(VALIDITY_ANNOTATION))
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    let kubeconfig = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| Zeroizing::new(bytes.0.clone()));

    StoredCredential {
        kubeconfig,
        issued_at,
        validity,
        resource_version: secret.metadata.resource_version.clone(),
    }
}

/// Whether `value` is accepted by the API server as a label value
pub(crate) fn is_valid_label_value(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    let bytes = value.as_bytes();
    value.len() <= MAX_LABEL_VALUE_LEN
        && bytes.first().is_some_and(u8::is_ascii_alphanumeric)
        && bytes.last().is_some_and(u8::is_ascii_alphanumeric)
        && bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(*b, b'-' | b'_' | b'.'))
}

/// Write payload, freshness annotations and ownership metadata into `secret`
///
/// Unrelated data keys, labels and annotations are preserved.
pub(crate) fn apply_credential(secret: &mut Secret, key: &str, kubeconfig: &[u8], record: &IssuanceRecord) {
    secret
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), ByteString(kubeconfig.to_vec()));

    let ownership = [
        (CLUSTER_NAME_KEY, &record.cluster_name),
        (CLUSTER_NAMESPACE_KEY, &record.cluster_namespace),
        (SHOOT_NAME_KEY, &record.shoot_name),
    ];

    let annotations = secret.metadata.annotations.get_or_insert_with(BTreeMap::new);
    annotations.insert(
        LAST_SYNC_ANNOTATION.to_string(),
        record.issued_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    annotations.insert(
        VALIDITY_ANNOTATION.to_string(),
        record.validity.as_secs().to_string(),
    );
    for (owner_key, value) in ownership {
        annotations.insert(owner_key.to_string(), value.clone());
    }

    let labels = secret.metadata.labels.get_or_insert_with(BTreeMap::new);
    labels.insert(MANAGED_BY_LABEL.to_string(), FIELD_MANAGER.to_string());
    for (owner_key, value) in ownership {
        if is_valid_label_value(value) {
            labels.insert(owner_key.to_string(), value.clone());
        } else {
            labels.remove(owner_key);
        }
    }
}
