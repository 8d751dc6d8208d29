//! Cluster provisioning API boundary
//!
//! The provisioning service is an external collaborator; this module only
//! defines its interface, the status model, and the error classification
//! the retry layer depends on.

pub mod local;
pub mod retry;

pub use local::LocalClusterApi;
pub use retry::{with_retries, RetryPolicy};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Lifecycle status reported by the provisioning service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    Starting,
    Bootstrapping,
    Running,
    Waiting,
    Terminating,
    Terminated,
    TerminatedWithErrors,
}

impl ClusterStatus {
    /// Whether this status ends the cluster lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ClusterStatus::Terminated | ClusterStatus::TerminatedWithErrors
        )
    }

    /// Whether this status is terminal-without-success
    pub fn is_failure(&self) -> bool {
        matches!(self, ClusterStatus::TerminatedWithErrors)
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClusterStatus::Starting => "STARTING",
            ClusterStatus::Bootstrapping => "BOOTSTRAPPING",
            ClusterStatus::Running => "RUNNING",
            ClusterStatus::Waiting => "WAITING",
            ClusterStatus::Terminating => "TERMINATING",
            ClusterStatus::Terminated => "TERMINATED",
            ClusterStatus::TerminatedWithErrors => "TERMINATED_WITH_ERRORS",
        };
        write!(f, "{}", s)
    }
}

/// An active cluster as returned by the listing call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: String,
    pub name: String,
    pub status: ClusterStatus,
}

/// A step submitted to a running cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStep {
    pub name: String,
    pub jar: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub main_class: Option<String>,
}

/// Errors from the provisioning service
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Throttling, timeouts, 5xx-class service trouble; retried with backoff
    #[error("transient service error: {0}")]
    Transient(String),

    /// The request was rejected; never retried
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced cluster does not exist; never retried
    #[error("cluster not found: {0}")]
    NotFound(String),
}

impl ProvisionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProvisionError::Transient(_))
    }
}

/// The resource-creation API, specified at its interface boundary only
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create a cluster from a document with nulls already stripped
    async fn create(&self, document: &Value) -> Result<String, ProvisionError>;

    /// Describe the current status of a cluster
    async fn describe(&self, cluster_id: &str) -> Result<ClusterStatus, ProvisionError>;

    /// List clusters currently in non-terminal states
    async fn list_active(&self) -> Result<Vec<ClusterSummary>, ProvisionError>;

    /// Submit a step to a running cluster
    async fn add_step(&self, cluster_id: &str, step: &ClusterStep) -> Result<String, ProvisionError>;

    /// Request termination of a cluster
    async fn terminate(&self, cluster_id: &str) -> Result<(), ProvisionError>;
}
