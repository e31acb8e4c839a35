//! Controller configuration

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Namespace holding the ledger record
pub const DEFAULT_LEDGER_NAMESPACE: &str = "ka-system";

/// Name of the ledger ConfigMap
pub const DEFAULT_LEDGER_NAME: &str = "ka-state";

/// Field manager used for server-side apply
pub const DEFAULT_FIELD_MANAGER: &str = "cluster-addon-controller";

/// Runtime settings shared by every reconcile pass
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub ledger_namespace: String,
    pub ledger_name: String,
    pub field_manager: String,
    /// Path or name of the `helm` executable
    pub helm_bin: String,
    /// Deadline for one reconcile pass
    pub reconcile_timeout: Duration,
    /// Timeout for a single HTTP request (manifests, release lookups)
    pub http_timeout: Duration,
    /// Token for the GitHub releases API; unauthenticated when absent
    pub github_token: Option<String>,
    /// Requeue delay after a failed pass
    pub requeue_after_failure: Duration,
    /// Requeue delay after the stack resource itself could not be read or updated
    pub requeue_after_fetch_error: Duration,
    /// Retry policy for conflicting ledger and node writes
    pub conflict_retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            ledger_namespace: DEFAULT_LEDGER_NAMESPACE.to_string(),
            ledger_name: DEFAULT_LEDGER_NAME.to_string(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            helm_bin: "helm".to_string(),
            reconcile_timeout: Duration::from_secs(15 * 60),
            http_timeout: Duration::from_secs(30),
            github_token: None,
            requeue_after_failure: Duration::from_secs(5),
            requeue_after_fetch_error: Duration::from_secs(10),
            conflict_retry: RetryPolicy::default(),
        }
    }
}
