//! Caller input to one launch run

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Everything a caller may say about a launch
///
/// The launch function carries the defaults; the input only names the
/// function and the per-run deviations the function permits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchInput {
    pub namespace: String,
    pub function: String,

    /// Replaces the function's rendered name template when set
    #[serde(default)]
    pub cluster_name: Option<String>,

    /// Field overrides, validated against the allow-list
    #[serde(default)]
    pub overrides: HashMap<String, Value>,

    /// Run-scoped tags merged into the document (caller wins)
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Per-run override of the function's running-guard default
    #[serde(default)]
    pub fail_if_running: Option<bool>,

    /// Per-run override of the function's wait-for-completion default
    #[serde(default)]
    pub wait_for_completion: Option<bool>,
}

impl LaunchInput {
    pub fn new(namespace: &str, function: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            function: function.to_string(),
            cluster_name: None,
            overrides: HashMap::new(),
            tags: BTreeMap::new(),
            fail_if_running: None,
            wait_for_completion: None,
        }
    }

    pub fn with_override(mut self, field: &str, value: Value) -> Self {
        self.overrides.insert(field.to_string(), value);
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_cluster_name(mut self, name: &str) -> Self {
        self.cluster_name = Some(name.to_string());
        self
    }
}
