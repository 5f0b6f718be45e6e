//! Creation, rotation and steady state

use super::fakes::*;
use gardener_kubeconfig_controller::constants::FORCE_ROTATION_ANNOTATION;
use gardener_kubeconfig_controller::controller::policy::Action;
use gardener_kubeconfig_controller::controller::reconciler::{status, PassState, Requeue};
use gardener_kubeconfig_controller::crd::{ConditionReason, ConditionStatus, ConditionType, State};
use std::collections::BTreeMap;
use std::time::Duration;

#[tokio::test]
async fn test_missing_secret_is_created() {
    let store = FakeStore::new();
    let issuer = FakeIssuer::new();

    let report = engine(&store, &issuer).run_pass(&cluster(), now()).await;

    assert_eq!(report.final_state, PassState::Done);
    assert_eq!(report.reason, ConditionReason::KubeconfigSecretCreated);
    assert_eq!(report.decision, Some(Action::CreateNew));
    assert_eq!(
        report.trace,
        vec![
            PassState::Start,
            PassState::Deciding,
            PassState::Issuing,
            PassState::Persisting,
            PassState::Reporting,
            PassState::Done,
        ]
    );
    assert_eq!(store.creates(), 1);
    assert_eq!(store.updates(), 0);
    assert_eq!(issuer.calls(), 1);
    assert_eq!(
        issuer.last_request(),
        Some(("c-1a2b3c".to_string(), "kyma-dev".to_string(), DAY))
    );

    let secret = store.secret().unwrap();
    assert_eq!(secret.data["config"], b"kubeconfig-c-1a2b3c-1".to_vec());
    assert_eq!(secret.issued_at, Some(now()));
    assert_eq!(secret.validity, Some(DAY));

    assert_eq!(report.status.state, Some(State::Ready));
    let condition = report
        .status
        .conditions
        .get(ConditionType::KubeconfigManagement)
        .unwrap();
    assert_eq!(condition.status, ConditionStatus::True);
    assert_eq!(condition.message, "Secret created successfully.");
    assert!(report.wrote_secret);
    assert_eq!(
        report.requeue,
        Requeue::After(Duration::from_secs(12 * 3600))
    );
}

#[tokio::test]
async fn test_secret_past_threshold_is_rotated() {
    let store = FakeStore::with_secret(hours_ago(13));
    let issuer = FakeIssuer::new();

    let report = engine(&store, &issuer).run_pass(&cluster(), now()).await;

    assert_eq!(report.reason, ConditionReason::KubeconfigSecretRotated);
    assert_eq!(report.decision, Some(Action::RotateNow));
    assert_eq!(store.updates(), 1);
    assert_eq!(store.creates(), 0);
    assert_eq!(store.payload().unwrap(), b"kubeconfig-c-1a2b3c-1".to_vec());
    assert_eq!(store.secret().unwrap().issued_at, Some(now()));
    assert_eq!(report.status.state, Some(State::Ready));
    assert_eq!(
        report.requeue,
        Requeue::After(Duration::from_secs(12 * 3600))
    );
}

#[tokio::test]
async fn test_fresh_secret_is_left_alone() {
    let store = FakeStore::with_secret(hours_ago(11));
    let issuer = FakeIssuer::new();

    let report = engine(&store, &issuer).run_pass(&cluster(), now()).await;

    assert_eq!(store.writes(), 0);
    assert_eq!(issuer.calls(), 0);
    assert_eq!(store.payload().unwrap(), b"old-kubeconfig".to_vec());
    assert!(!report.wrote_secret);
    assert_eq!(
        report.decision,
        Some(Action::NoActionNeeded(now() + chrono::Duration::hours(1)))
    );
    assert_eq!(report.requeue, Requeue::After(Duration::from_secs(3600)));
    assert_eq!(
        report.trace,
        vec![
            PassState::Start,
            PassState::Deciding,
            PassState::Reporting,
            PassState::Done,
        ]
    );
}

#[tokio::test]
async fn test_repeated_passes_are_idempotent() {
    let store = FakeStore::with_secret(hours_ago(2));
    let issuer = FakeIssuer::new();
    let engine = engine(&store, &issuer);

    let mut cluster = cluster();
    cluster.status = Some({
        let mut status = gardener_kubeconfig_controller::crd::GardenerClusterStatus::default();
        status.set_ready(
            ConditionType::KubeconfigManagement,
            ConditionReason::KubeconfigSecretRotated,
            hours_ago(2),
        );
        status
    });

    for _ in 0..3 {
        let report = engine.run_pass(&cluster, now()).await;
        assert_eq!(report.reason, ConditionReason::KubeconfigSecretRotated);
        assert_eq!(report.status.state, Some(State::Ready));
        assert_eq!(report.status.conditions.len(), 1);
        cluster.status = Some(report.status);
    }

    assert_eq!(store.writes(), 0);
    assert_eq!(issuer.calls(), 0);
    assert_eq!(store.reads(), 3);
}

#[tokio::test]
async fn test_fresh_secret_without_prior_condition_is_up_to_date() {
    let store = FakeStore::with_secret(hours_ago(1));
    let issuer = FakeIssuer::new();

    let report = engine(&store, &issuer).run_pass(&cluster(), now()).await;

    assert_eq!(report.reason, ConditionReason::KubeconfigSecretUpToDate);
    assert_eq!(report.status.state, Some(State::Ready));
}

#[tokio::test]
async fn test_fresh_secret_after_failure_reports_ready() {
    let store = FakeStore::with_secret(hours_ago(1));
    let issuer = FakeIssuer::new();

    let mut cluster = cluster();
    let mut status = gardener_kubeconfig_controller::crd::GardenerClusterStatus::default();
    status.set_error(
        ConditionType::KubeconfigManagement,
        ConditionReason::FailedToGetSecret,
        "timeout",
        hours_ago(1),
    );
    cluster.status = Some(status);

    let report = engine(&store, &issuer).run_pass(&cluster, now()).await;

    assert_eq!(report.reason, ConditionReason::KubeconfigSecretUpToDate);
    assert_eq!(report.status.state, Some(State::Ready));
    assert_eq!(report.status.conditions.len(), 1);
}

#[tokio::test]
async fn test_create_then_rotate_keeps_one_condition() {
    let store = FakeStore::new();
    let issuer = FakeIssuer::new();
    let engine = engine(&store, &issuer);
    let mut cluster = cluster();

    let created = engine.run_pass(&cluster, now()).await;
    assert_eq!(created.reason, ConditionReason::KubeconfigSecretCreated);
    cluster.status = Some(created.status);

    let later = now() + chrono::Duration::hours(13);
    let rotated = engine.run_pass(&cluster, later).await;
    assert_eq!(rotated.reason, ConditionReason::KubeconfigSecretRotated);
    assert_eq!(rotated.status.conditions.len(), 1);
    assert_eq!(store.creates(), 1);
    assert_eq!(store.updates(), 1);
    assert_eq!(store.payload().unwrap(), b"kubeconfig-c-1a2b3c-2".to_vec());
    assert_eq!(store.secret().unwrap().issued_at, Some(later));
}

#[tokio::test]
async fn test_forced_rotation_rotates_fresh_secret() {
    let store = FakeStore::with_secret(hours_ago(1));
    let issuer = FakeIssuer::new();

    let mut cluster = cluster();
    cluster.metadata.annotations = Some(BTreeMap::from([(
        FORCE_ROTATION_ANNOTATION.to_string(),
        "true".to_string(),
    )]));

    let report = engine(&store, &issuer).run_pass(&cluster, now()).await;

    assert_eq!(report.reason, ConditionReason::KubeconfigSecretRotated);
    assert_eq!(report.decision, Some(Action::RotateNow));
    assert_eq!(store.updates(), 1);
    assert_eq!(issuer.calls(), 1);
}

#[tokio::test]
async fn test_no_op_pass_restamps_transition_time() {
    let store = FakeStore::with_secret(hours_ago(2));
    let issuer = FakeIssuer::new();
    let engine = engine(&store, &issuer);
    let mut cluster = cluster();

    let first = engine.run_pass(&cluster, now()).await;
    cluster.status = Some(first.status);

    let later = now() + chrono::Duration::hours(1);
    let second = engine.run_pass(&cluster, later).await;
    let condition = second
        .status
        .conditions
        .get(ConditionType::KubeconfigManagement)
        .unwrap();

    assert!(!second.wrote_secret);
    assert_eq!(condition.last_transition_time, "2024-05-02T01:00:00Z");
    assert_eq!(
        status::status_patch(&second)["status"]["conditions"][0]["lastTransitionTime"],
        "2024-05-02T01:00:00Z"
    );
}

#[tokio::test]
async fn test_forced_create_serves_the_request() {
    let store = FakeStore::new();
    let issuer = FakeIssuer::new();
    let engine = engine(&store, &issuer);

    let mut cluster = cluster();
    cluster.metadata.annotations = Some(BTreeMap::from([(
        FORCE_ROTATION_ANNOTATION.to_string(),
        "true".to_string(),
    )]));

    let created = engine.run_pass(&cluster, now()).await;
    assert_eq!(created.reason, ConditionReason::KubeconfigSecretCreated);
    assert!(status::served_force_rotation(&cluster, &created));

    // The annotation is gone once the request was served.
    cluster.metadata.annotations = Some(BTreeMap::new());
    cluster.status = Some(created.status);
    let next = engine
        .run_pass(&cluster, now() + chrono::Duration::seconds(1))
        .await;

    assert!(!next.wrote_secret);
    assert_eq!(issuer.calls(), 1);
    assert_eq!(store.creates(), 1);
    assert_eq!(store.updates(), 0);
}

#[tokio::test]
async fn test_forced_rotation_without_secret_creates() {
    let store = FakeStore::new();
    let issuer = FakeIssuer::new();

    let mut cluster = cluster();
    cluster.metadata.annotations = Some(BTreeMap::from([(
        FORCE_ROTATION_ANNOTATION.to_string(),
        "true".to_string(),
    )]));

    let report = engine(&store, &issuer).run_pass(&cluster, now()).await;

    assert_eq!(report.reason, ConditionReason::KubeconfigSecretCreated);
    assert_eq!(store.creates(), 1);
}

#[tokio::test]
async fn test_secret_without_record_is_rotated() {
    let store = FakeStore::new();
    store.insert(FakeSecret {
        data: BTreeMap::from([("config".to_string(), b"hand-made".to_vec())]),
        issued_at: None,
        validity: None,
        resource_version: 0,
    });
    let issuer = FakeIssuer::new();

    let report = engine(&store, &issuer).run_pass(&cluster(), now()).await;

    assert_eq!(report.reason, ConditionReason::KubeconfigSecretRotated);
    assert_eq!(store.secret().unwrap().issued_at, Some(now()));
}
