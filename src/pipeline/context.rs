//! Per-run execution context
//!
//! Created when a run starts, filled in stage by stage, and dropped once
//! the run reaches a terminal state. Snapshots of the resolved templates
//! live here so no stage reads the registry twice.

use crate::completion::ContinuationToken;
use crate::core::configuration::Configuration;
use crate::core::document::LaunchDocument;
use crate::core::function::LaunchFunction;
use crate::core::profile::Profile;
use crate::pipeline::input::LaunchInput;
use crate::provision::ClusterStatus;
use uuid::Uuid;

pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub input: LaunchInput,

    /// Resolved once at pipeline start; read-only snapshots
    pub function: Option<LaunchFunction>,
    pub profile: Option<Profile>,
    pub configuration: Option<Configuration>,

    /// The canonical document for the run, rebuilt by the override stage
    pub document: Option<LaunchDocument>,

    pub cluster_name: Option<String>,
    pub cluster_id: Option<String>,
    pub token: ContinuationToken,
    pub expected: ClusterStatus,
}

impl ExecutionContext {
    pub fn new(input: LaunchInput) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            input,
            function: None,
            profile: None,
            configuration: None,
            document: None,
            cluster_name: None,
            cluster_id: None,
            token: ContinuationToken::new(),
            expected: ClusterStatus::Waiting,
        }
    }
}
