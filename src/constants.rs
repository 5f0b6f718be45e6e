//! # Constants
//!
//! Default values and well-known names shared across the controller.

/// Field manager used for all server-side writes
pub const FIELD_MANAGER: &str = "gardener-kubeconfig-controller";

/// Secret annotation holding the RFC3339 issuance time of the stored kubeconfig
pub const LAST_SYNC_ANNOTATION: &str = "infrastructuremanager.kyma-project.io/last-sync";

/// Secret annotation holding the validity (seconds) requested at issuance
pub const VALIDITY_ANNOTATION: &str = "infrastructuremanager.kyma-project.io/validity";

/// GardenerCluster annotation requesting an immediate rotation
pub const FORCE_ROTATION_ANNOTATION: &str =
    "infrastructuremanager.kyma-project.io/force-kubeconfig-rotation";

/// Secret label selecting the secrets this controller writes
pub const MANAGED_BY_LABEL: &str = "infrastructuremanager.kyma-project.io/managed-by";

/// Ownership keys of a managed secret
///
/// Always written as annotations, which map secret events back to their
/// GardenerCluster. Also written as labels when the value fits a label value.
pub const CLUSTER_NAME_KEY: &str = "infrastructuremanager.kyma-project.io/cluster-name";
pub const CLUSTER_NAMESPACE_KEY: &str = "infrastructuremanager.kyma-project.io/cluster-namespace";
pub const SHOOT_NAME_KEY: &str = "infrastructuremanager.kyma-project.io/shoot-name";

/// Longest value Kubernetes accepts for a label
pub const MAX_LABEL_VALUE_LEN: usize = 63;

/// Default path of the kubeconfig the controller uses to talk to Gardener
pub const DEFAULT_GARDENER_KUBECONFIG_PATH: &str = "/gardener/kubeconfig";

/// Default Gardener project name
pub const DEFAULT_GARDENER_PROJECT_NAME: &str = "gardener-project";

/// Default kubeconfig validity requested from Gardener (24 hours)
pub const DEFAULT_KUBECONFIG_VALIDITY_SECS: u64 = 24 * 3600;

/// Minimum validity Gardener accepts for an admin kubeconfig request (10 minutes)
pub const MIN_KUBECONFIG_VALIDITY_SECS: u64 = 600;

/// Rotate once this fraction of the validity remains
pub const DEFAULT_ROTATION_THRESHOLD_FRACTION: f64 = 0.5;

/// Fibonacci backoff bounds for failed passes
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 15;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 600;

/// Deadline for a single call to Gardener or the API server
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Concurrent reconciles across distinct GardenerCluster resources
pub const DEFAULT_RECONCILE_CONCURRENCY: u16 = 10;

/// HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Requeue used when the backoff table cannot be locked
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;
