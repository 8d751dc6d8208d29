//! Launch function: a persisted Profile + Configuration binding
//!
//! Built once, persisted to the registry, and executed many times. Loads
//! from the registry come back read-only.

use crate::core::error::LaunchError;
use crate::core::overrides::OverrideSpec;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to a named template in a namespace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateRef {
    pub namespace: String,
    pub name: String,
}

impl TemplateRef {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// Named, persisted binding of Profile + Configuration + pipeline policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchFunction {
    pub name: String,
    pub namespace: String,

    pub profile: TemplateRef,
    pub configuration: TemplateRef,

    /// Cluster-name template; `{name}` and `{date}` placeholders are rendered
    /// at launch time
    pub cluster_name_template: String,

    /// Default for the pre-flight running guard (caller-overridable)
    pub fail_if_running: bool,

    /// Notification targets
    #[serde(default)]
    pub success_target: Option<String>,
    #[serde(default)]
    pub failure_target: Option<String>,

    /// The only fields a caller may mutate at launch time
    #[serde(default)]
    pub allowed_overrides: BTreeMap<String, OverrideSpec>,

    /// Whether a launch blocks until the cluster reaches its terminal state
    pub wait_for_completion: bool,

    #[serde(default)]
    read_only: bool,
}

impl LaunchFunction {
    pub fn new(namespace: &str, name: &str, profile: TemplateRef, configuration: TemplateRef) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            profile,
            configuration,
            cluster_name_template: "{name}".to_string(),
            fail_if_running: true,
            success_target: None,
            failure_target: None,
            allowed_overrides: BTreeMap::new(),
            wait_for_completion: false,
            read_only: false,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn mark_read_only(&mut self) {
        self.read_only = true;
    }

    /// Expose one more overridable field; rejected after rehydration
    pub fn allow_override(&mut self, field: &str, spec: OverrideSpec) -> Result<(), LaunchError> {
        if self.read_only {
            return Err(LaunchError::read_only("launch function", &self.name));
        }
        self.allowed_overrides.insert(field.to_string(), spec);
        Ok(())
    }

    /// Render the cluster name for a run
    pub fn render_cluster_name(&self) -> String {
        self.cluster_name_template
            .replace("{name}", &self.name)
            .replace("{date}", &Utc::now().format("%Y%m%d").to_string())
    }
}
