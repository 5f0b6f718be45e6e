//! # GardenerCluster Status
//!
//! Status types and the condition model.
//!
//! Conditions are kept in a map keyed by [`ConditionType`], so recording a new
//! evaluation replaces the previous entry of the same type. On the wire the map is
//! serialized as the usual Kubernetes condition list, ordered by type.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Aggregate state of a GardenerCluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum State {
    Ready,
    Error,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Ready => f.write_str("Ready"),
            State::Error => f.write_str("Error"),
        }
    }
}

/// Concern a condition reports on
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, JsonSchema,
)]
pub enum ConditionType {
    /// Issuance and rotation of the kubeconfig secret
    KubeconfigManagement,
}

/// Status of a condition (True, False, Unknown)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Closed set of reasons a condition can carry
///
/// `KubeconfigSecretUpToDate` is newer than the other six: a fresh secret with no
/// earlier success reason on record reports it, so consumers matching on reasons
/// must accept it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionReason {
    KubeconfigSecretCreated,
    KubeconfigSecretRotated,
    KubeconfigSecretUpToDate,
    // Older controllers wrote these under different names.
    #[serde(alias = "ConditionReasonFailedToCreateSecret")]
    FailedToCreateSecret,
    FailedToUpdateSecret,
    #[serde(alias = "FailedToCheckSecret")]
    FailedToGetSecret,
    FailedToGetKubeconfig,
}

impl ConditionReason {
    /// Human-readable sentence used as the condition message
    pub fn message(self) -> &'static str {
        match self {
            ConditionReason::KubeconfigSecretCreated => "Secret created successfully.",
            ConditionReason::KubeconfigSecretRotated => "Secret rotated successfully.",
            ConditionReason::KubeconfigSecretUpToDate => "Secret is up to date.",
            ConditionReason::FailedToCreateSecret => "Failed to create secret.",
            ConditionReason::FailedToUpdateSecret => "Failed to rotate secret.",
            ConditionReason::FailedToGetSecret => "Failed to get secret.",
            ConditionReason::FailedToGetKubeconfig => "Failed to get kubeconfig.",
        }
    }

    /// Whether this reason reports a failed pass
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            ConditionReason::FailedToCreateSecret
                | ConditionReason::FailedToUpdateSecret
                | ConditionReason::FailedToGetSecret
                | ConditionReason::FailedToGetKubeconfig
        )
    }

    /// Stable label value for metrics
    pub fn as_str(self) -> &'static str {
        match self {
            ConditionReason::KubeconfigSecretCreated => "KubeconfigSecretCreated",
            ConditionReason::KubeconfigSecretRotated => "KubeconfigSecretRotated",
            ConditionReason::KubeconfigSecretUpToDate => "KubeconfigSecretUpToDate",
            ConditionReason::FailedToCreateSecret => "FailedToCreateSecret",
            ConditionReason::FailedToUpdateSecret => "FailedToUpdateSecret",
            ConditionReason::FailedToGetSecret => "FailedToGetSecret",
            ConditionReason::FailedToGetKubeconfig => "FailedToGetKubeconfig",
        }
    }
}

impl fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition represents the latest observation for one concern
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: ConditionType,
    pub status: ConditionStatus,
    pub reason: ConditionReason,
    pub message: String,
    /// RFC3339 timestamp
    pub last_transition_time: String,
}

/// Conditions keyed by type
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct ConditionSet(BTreeMap<ConditionType, Condition>);

impl ConditionSet {
    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.0.get(&condition_type)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.values()
    }

    /// Replace the entry of `condition.type`, returning the previous one
    fn replace(&mut self, condition: Condition) -> Option<Condition> {
        self.0.insert(condition.r#type, condition)
    }
}

impl From<Vec<Condition>> for ConditionSet {
    fn from(conditions: Vec<Condition>) -> Self {
        // A list carrying duplicate types keeps the last entry.
        Self(conditions.into_iter().map(|c| (c.r#type, c)).collect())
    }
}

impl From<ConditionSet> for Vec<Condition> {
    fn from(set: ConditionSet) -> Self {
        set.0.into_values().collect()
    }
}

/// Status of the GardenerCluster resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GardenerClusterStatus {
    /// Outcome of the most recent reconcile pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<State>,
    /// Conditions represent the latest available observations, one per type
    #[serde(default)]
    #[schemars(with = "Vec<Condition>")]
    pub conditions: ConditionSet,
}

impl GardenerClusterStatus {
    /// Record the outcome of an evaluation for `condition_type`
    ///
    /// Any existing entry of the type is replaced and stamped with `now`, whether or
    /// not its status changed.
    pub fn set_condition(
        &mut self,
        outcome: State,
        condition_type: ConditionType,
        reason: ConditionReason,
        status: ConditionStatus,
        detail: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let message = match detail {
            Some(detail) => format!("{} Error: {}", reason.message(), detail),
            None => reason.message().to_string(),
        };

        self.state = Some(outcome);
        self.conditions.replace(Condition {
            r#type: condition_type,
            status,
            reason,
            message,
            last_transition_time: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }

    /// Record a successful evaluation
    pub fn set_ready(
        &mut self,
        condition_type: ConditionType,
        reason: ConditionReason,
        now: DateTime<Utc>,
    ) {
        self.set_condition(
            State::Ready,
            condition_type,
            reason,
            ConditionStatus::True,
            None,
            now,
        );
    }

    /// Record a failed evaluation, embedding the cause in the message
    pub fn set_error(
        &mut self,
        condition_type: ConditionType,
        reason: ConditionReason,
        cause: &str,
        now: DateTime<Utc>,
    ) {
        self.set_condition(
            State::Error,
            condition_type,
            reason,
            ConditionStatus::False,
            Some(cause),
            now,
        );
    }

    /// Reason of the kubeconfig management condition, if recorded
    pub fn management_reason(&self) -> Option<ConditionReason> {
        self.conditions
            .get(ConditionType::KubeconfigManagement)
            .map(|c| c.reason)
    }
}
