//! In-memory credential store and issuer

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gardener_kubeconfig_controller::controller::reconciler::{EngineConfig, ReconciliationEngine};
use gardener_kubeconfig_controller::crd::{
    GardenerCluster, GardenerClusterSpec, Kubeconfig, SecretRef, Shoot,
};
use gardener_kubeconfig_controller::provider::{
    CredentialIssuer, CredentialStore, IssuanceRecord, IssuerError, KubeconfigBytes, StoreError,
    StoredCredential,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use zeroize::Zeroizing;

pub const DAY: Duration = Duration::from_secs(24 * 3600);

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap()
}

pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    now() - chrono::Duration::hours(hours)
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        project_name: "kyma-dev".to_string(),
        validity: DAY,
        rotation_threshold_fraction: 0.5,
        call_timeout: Duration::from_secs(30),
    }
}

pub fn engine(store: &Arc<FakeStore>, issuer: &Arc<FakeIssuer>) -> ReconciliationEngine {
    ReconciliationEngine::new(store.clone(), issuer.clone(), engine_config())
}

pub fn cluster() -> GardenerCluster {
    let mut cluster = GardenerCluster::new(
        "runtime-a",
        GardenerClusterSpec {
            kubeconfig: Kubeconfig {
                secret: secret_ref(),
            },
            shoot: Shoot {
                name: "c-1a2b3c".to_string(),
            },
        },
    );
    cluster.metadata.namespace = Some("kcp-system".to_string());
    cluster
}

pub fn secret_ref() -> SecretRef {
    SecretRef {
        name: "kubeconfig-runtime-a".to_string(),
        namespace: "kcp-system".to_string(),
        key: "config".to_string(),
    }
}

/// A secret as held by [`FakeStore`]
#[derive(Debug, Clone)]
pub struct FakeSecret {
    pub data: BTreeMap<String, Vec<u8>>,
    pub issued_at: Option<DateTime<Utc>>,
    pub validity: Option<Duration>,
    pub resource_version: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    secrets: HashMap<(String, String), FakeSecret>,
    next_version: u64,
    reads: usize,
    creates: usize,
    updates: usize,
    read_failures: VecDeque<StoreError>,
    /// Fail the n-th read (1-based) with the given error
    failing_read: Option<(usize, StoreError)>,
    create_failures: VecDeque<StoreError>,
    update_failures: VecDeque<StoreError>,
    /// Updates that see the secret rewritten by someone else first
    interfering_writes: usize,
    read_delay: Option<Duration>,
}

/// Secret store keeping secrets in memory with resourceVersion checks
#[derive(Debug, Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed a secret issued at `issued_at` with a 24h validity
    pub fn with_secret(issued_at: DateTime<Utc>) -> Arc<Self> {
        let store = Self::new();
        store.insert(FakeSecret {
            data: BTreeMap::from([("config".to_string(), b"old-kubeconfig".to_vec())]),
            issued_at: Some(issued_at),
            validity: Some(DAY),
            resource_version: 0,
        });
        store
    }

    pub fn insert(&self, mut secret: FakeSecret) {
        let mut state = self.state.lock().unwrap();
        state.next_version += 1;
        secret.resource_version = state.next_version;
        let key = (secret_ref().namespace, secret_ref().name);
        state.secrets.insert(key, secret);
    }

    pub fn secret(&self) -> Option<FakeSecret> {
        let state = self.state.lock().unwrap();
        state
            .secrets
            .get(&(secret_ref().namespace, secret_ref().name))
            .cloned()
    }

    pub fn payload(&self) -> Option<Vec<u8>> {
        self.secret()
            .and_then(|s| s.data.get(&secret_ref().key).cloned())
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads
    }

    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn updates(&self) -> usize {
        self.state.lock().unwrap().updates
    }

    pub fn writes(&self) -> usize {
        self.creates() + self.updates()
    }

    pub fn fail_next_read(&self, error: StoreError) {
        self.state.lock().unwrap().read_failures.push_back(error);
    }

    pub fn fail_read_number(&self, n: usize, error: StoreError) {
        self.state.lock().unwrap().failing_read = Some((n, error));
    }

    pub fn fail_next_create(&self, error: StoreError) {
        self.state.lock().unwrap().create_failures.push_back(error);
    }

    pub fn fail_next_update(&self, error: StoreError) {
        self.state.lock().unwrap().update_failures.push_back(error);
    }

    pub fn interfere_with_next_updates(&self, count: usize) {
        self.state.lock().unwrap().interfering_writes = count;
    }

    pub fn delay_reads(&self, delay: Duration) {
        self.state.lock().unwrap().read_delay = Some(delay);
    }

    fn key(secret: &SecretRef) -> (String, String) {
        (secret.namespace.clone(), secret.name.clone())
    }
}

#[async_trait]
impl CredentialStore for FakeStore {
    async fn read(&self, secret: &SecretRef) -> Result<StoredCredential, StoreError> {
        let delay = self.state.lock().unwrap().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.reads += 1;
        if let Some(error) = state.read_failures.pop_front() {
            return Err(error);
        }
        let reads = state.reads;
        if state.failing_read.as_ref().is_some_and(|(n, _)| *n == reads) {
            if let Some((_, error)) = state.failing_read.take() {
                return Err(error);
            }
        }
        let stored = state
            .secrets
            .get(&Self::key(secret))
            .ok_or_else(|| StoreError::NotFound(secret.name.clone()))?;
        Ok(StoredCredential {
            kubeconfig: stored
                .data
                .get(&secret.key)
                .map(|bytes| Zeroizing::new(bytes.clone())),
            issued_at: stored.issued_at,
            validity: stored.validity,
            resource_version: Some(stored.resource_version.to_string()),
        })
    }

    async fn create(
        &self,
        secret: &SecretRef,
        kubeconfig: &[u8],
        record: &IssuanceRecord,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.creates += 1;
        if let Some(error) = state.create_failures.pop_front() {
            return Err(error);
        }
        if state.secrets.contains_key(&Self::key(secret)) {
            return Err(StoreError::AlreadyExists(secret.name.clone()));
        }
        state.next_version += 1;
        let version = state.next_version;
        state.secrets.insert(
            Self::key(secret),
            FakeSecret {
                data: BTreeMap::from([(secret.key.clone(), kubeconfig.to_vec())]),
                issued_at: Some(record.issued_at),
                validity: Some(record.validity),
                resource_version: version,
            },
        );
        Ok(())
    }

    async fn update(
        &self,
        secret: &SecretRef,
        kubeconfig: &[u8],
        record: &IssuanceRecord,
        resource_version: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.updates += 1;
        if let Some(error) = state.update_failures.pop_front() {
            return Err(error);
        }
        if state.interfering_writes > 0 {
            state.interfering_writes -= 1;
            state.next_version += 1;
            let version = state.next_version;
            if let Some(stored) = state.secrets.get_mut(&Self::key(secret)) {
                stored.resource_version = version;
            }
        }

        let next_version = state.next_version + 1;
        let stored = state
            .secrets
            .get_mut(&Self::key(secret))
            .ok_or_else(|| StoreError::NotFound(secret.name.clone()))?;
        if let Some(expected) = resource_version {
            if expected != stored.resource_version.to_string() {
                return Err(StoreError::Conflict(secret.name.clone()));
            }
        }
        stored.data.insert(secret.key.clone(), kubeconfig.to_vec());
        stored.issued_at = Some(record.issued_at);
        stored.validity = Some(record.validity);
        stored.resource_version = next_version;
        state.next_version = next_version;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct IssuerState {
    calls: usize,
    failures: VecDeque<IssuerError>,
    delay: Option<Duration>,
    last_request: Option<(String, String, Duration)>,
}

/// Issuer returning `kubeconfig-<shoot>-<n>` for the n-th call
#[derive(Debug, Default)]
pub struct FakeIssuer {
    state: Mutex<IssuerState>,
}

impl FakeIssuer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    pub fn last_request(&self) -> Option<(String, String, Duration)> {
        self.state.lock().unwrap().last_request.clone()
    }

    pub fn fail_next(&self, error: IssuerError) {
        self.state.lock().unwrap().failures.push_back(error);
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }
}

#[async_trait]
impl CredentialIssuer for FakeIssuer {
    async fn issue(
        &self,
        shoot_name: &str,
        project_name: &str,
        validity: Duration,
    ) -> Result<KubeconfigBytes, IssuerError> {
        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        state.last_request = Some((shoot_name.to_string(), project_name.to_string(), validity));
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        Ok(Zeroizing::new(
            format!("kubeconfig-{}-{}", shoot_name, state.calls).into_bytes(),
        ))
    }
}
