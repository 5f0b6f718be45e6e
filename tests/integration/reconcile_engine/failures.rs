//! Failures of each step are recorded and retried with backoff

use super::fakes::*;
use gardener_kubeconfig_controller::controller::reconciler::{PassState, Requeue};
use gardener_kubeconfig_controller::crd::{ConditionReason, ConditionStatus, ConditionType, State};
use gardener_kubeconfig_controller::provider::{IssuerError, StoreError};

#[tokio::test]
async fn test_issuer_failure_leaves_store_untouched() {
    let store = FakeStore::with_secret(hours_ago(13));
    let issuer = FakeIssuer::new();
    issuer.fail_next(IssuerError::ShootNotFound {
        shoot: "c-1a2b3c".to_string(),
        project: "kyma-dev".to_string(),
    });

    let report = engine(&store, &issuer).run_pass(&cluster(), now()).await;

    assert_eq!(report.final_state, PassState::Failed);
    assert_eq!(report.requeue, Requeue::Backoff);
    assert_eq!(report.reason, ConditionReason::FailedToGetKubeconfig);
    assert_eq!(store.writes(), 0);
    assert_eq!(store.payload().unwrap(), b"old-kubeconfig".to_vec());

    assert_eq!(report.status.state, Some(State::Error));
    let condition = report
        .status
        .conditions
        .get(ConditionType::KubeconfigManagement)
        .unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(
        condition.message,
        "Failed to get kubeconfig. Error: shoot 'c-1a2b3c' not found in project 'kyma-dev'"
    );
    assert_eq!(
        report.trace.last(),
        Some(&PassState::Failed)
    );
}

#[tokio::test]
async fn test_auth_denied_is_reported() {
    let store = FakeStore::new();
    let issuer = FakeIssuer::new();
    issuer.fail_next(IssuerError::AuthDenied("HTTP 403: forbidden".to_string()));

    let report = engine(&store, &issuer).run_pass(&cluster(), now()).await;

    assert_eq!(report.reason, ConditionReason::FailedToGetKubeconfig);
    assert!(report.failure.unwrap().contains("forbidden"));
    assert_eq!(store.creates(), 0);
}

#[tokio::test]
async fn test_read_failure_skips_issuance() {
    let store = FakeStore::with_secret(hours_ago(13));
    store.fail_next_read(StoreError::Api("HTTP 500: etcd unavailable".to_string()));
    let issuer = FakeIssuer::new();

    let report = engine(&store, &issuer).run_pass(&cluster(), now()).await;

    assert_eq!(report.reason, ConditionReason::FailedToGetSecret);
    assert_eq!(report.decision, None);
    assert_eq!(report.trace, vec![PassState::Start, PassState::Failed]);
    assert_eq!(issuer.calls(), 0);
    assert_eq!(store.writes(), 0);
    let condition = report
        .status
        .conditions
        .get(ConditionType::KubeconfigManagement)
        .unwrap();
    assert!(condition.message.starts_with("Failed to get secret. Error: "));
    assert!(condition.message.contains("etcd unavailable"));
}

#[tokio::test]
async fn test_create_failure_is_reported() {
    let store = FakeStore::new();
    store.fail_next_create(StoreError::Api("HTTP 422: invalid".to_string()));
    let issuer = FakeIssuer::new();

    let report = engine(&store, &issuer).run_pass(&cluster(), now()).await;

    assert_eq!(report.reason, ConditionReason::FailedToCreateSecret);
    assert_eq!(report.requeue, Requeue::Backoff);
    assert!(!report.wrote_secret);
    assert!(store.secret().is_none());
}

#[tokio::test]
async fn test_racing_create_is_reported_then_repaired() {
    let store = FakeStore::new();
    store.fail_next_create(StoreError::AlreadyExists("kubeconfig-runtime-a".to_string()));
    let issuer = FakeIssuer::new();
    let engine = engine(&store, &issuer);

    let report = engine.run_pass(&cluster(), now()).await;
    assert_eq!(report.reason, ConditionReason::FailedToCreateSecret);

    let retry = engine.run_pass(&cluster(), now()).await;
    assert_eq!(retry.reason, ConditionReason::KubeconfigSecretCreated);
    assert_eq!(store.creates(), 2);
}

#[tokio::test]
async fn test_update_failure_is_reported() {
    let store = FakeStore::with_secret(hours_ago(20));
    store.fail_next_update(StoreError::Api("HTTP 500: boom".to_string()));
    let issuer = FakeIssuer::new();

    let report = engine(&store, &issuer).run_pass(&cluster(), now()).await;

    assert_eq!(report.reason, ConditionReason::FailedToUpdateSecret);
    assert_eq!(store.updates(), 1);
    assert_eq!(store.payload().unwrap(), b"old-kubeconfig".to_vec());
    let condition = report
        .status
        .conditions
        .get(ConditionType::KubeconfigManagement)
        .unwrap();
    assert!(condition.message.starts_with("Failed to rotate secret. Error: "));
}

#[tokio::test]
async fn test_failure_replaces_previous_ready_condition() {
    let store = FakeStore::new();
    let issuer = FakeIssuer::new();
    let engine = engine(&store, &issuer);
    let mut cluster = cluster();

    let created = engine.run_pass(&cluster, now()).await;
    cluster.status = Some(created.status);

    store.fail_next_read(StoreError::Timeout(std::time::Duration::from_secs(30)));
    let failed = engine.run_pass(&cluster, now()).await;

    assert_eq!(failed.status.conditions.len(), 1);
    assert_eq!(failed.status.state, Some(State::Error));
    assert_eq!(
        failed.status.management_reason(),
        Some(ConditionReason::FailedToGetSecret)
    );
}
