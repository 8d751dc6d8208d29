//! Shared mock collaborators for integration scenarios

use async_trait::async_trait;
use launchpad::core::configuration::{Configuration, InstanceGroupSpec, Topology};
use launchpad::core::function::{LaunchFunction, TemplateRef};
use launchpad::core::profile::Profile;
use launchpad::notify::{Notifier, NotifyError};
use launchpad::pipeline::{LaunchPipeline, PipelineSettings};
use launchpad::provision::{
    ClusterApi, ClusterStatus, ClusterStep, ClusterSummary, ProvisionError, RetryPolicy,
};
use launchpad::registry::{InMemoryRegistry, TemplateStore};
use launchpad::OverrideSpec;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Cluster API that walks each cluster through a scripted status sequence
///
/// Every created cluster gets its own copy of the script; describe advances
/// one entry per call and clamps at the last.
pub struct ScriptedClusterApi {
    script: Vec<ClusterStatus>,
    cursors: Mutex<HashMap<String, usize>>,
    pub created: Mutex<Vec<Value>>,
    pub terminated: Mutex<Vec<String>>,
    pub active: Vec<ClusterSummary>,
    next_id: AtomicUsize,
}

impl ScriptedClusterApi {
    pub fn with_script(script: Vec<ClusterStatus>) -> Self {
        Self {
            script,
            cursors: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            terminated: Mutex::new(Vec::new()),
            active: Vec::new(),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn with_active(mut self, summary: ClusterSummary) -> Self {
        self.active.push(summary);
        self
    }

    pub fn create_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl ClusterApi for ScriptedClusterApi {
    async fn create(&self, document: &Value) -> Result<String, ProvisionError> {
        let id = format!("j-{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.created.lock().unwrap().push(document.clone());
        Ok(id)
    }

    async fn describe(&self, cluster_id: &str) -> Result<ClusterStatus, ProvisionError> {
        let mut cursors = self.cursors.lock().unwrap();
        let cursor = cursors.entry(cluster_id.to_string()).or_insert(0);
        let status = self.script[(*cursor).min(self.script.len() - 1)];
        *cursor += 1;
        Ok(status)
    }

    async fn list_active(&self) -> Result<Vec<ClusterSummary>, ProvisionError> {
        Ok(self.active.clone())
    }

    async fn add_step(
        &self,
        _cluster_id: &str,
        step: &ClusterStep,
    ) -> Result<String, ProvisionError> {
        Ok(format!("s-{}", step.name))
    }

    async fn terminate(&self, cluster_id: &str) -> Result<(), ProvisionError> {
        self.terminated.lock().unwrap().push(cluster_id.to_string());
        Ok(())
    }
}

/// Notifier that records every publish
#[derive(Default)]
pub struct RecordingNotifier {
    pub published: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, target: &str, subject: &str, message: &str) -> Result<(), NotifyError> {
        self.published.lock().unwrap().push((
            target.to_string(),
            subject.to_string(),
            message.to_string(),
        ));
        Ok(())
    }
}

impl RecordingNotifier {
    pub fn messages_to(&self, target: &str) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| t == target)
            .map(|(_, subject, message)| (subject.clone(), message.clone()))
            .collect()
    }
}

/// Publish the "basic" profile/configuration/function trio to a fresh store
pub async fn seed_basic_templates(store: &TemplateStore, wait_for_completion: bool) {
    let mut profile = Profile::new("default", "secure");
    profile.subnet_ids = vec!["subnet-1".to_string()];
    profile.service_role = Some("service-role".to_string());
    profile.instance_role = Some("instance-role".to_string());
    profile.log_destination = Some("s3://logs/clusters/".to_string());
    store.save_profile(&profile).await.unwrap();

    let configuration = Configuration::builder("default", "basic")
        .applications(&["Spark"])
        .release_label("emr-6.9.0")
        .topology(Topology::InstanceGroups {
            groups: vec![
                InstanceGroupSpec {
                    name: "primary".to_string(),
                    role: "MASTER".to_string(),
                    instance_type: "m5.xlarge".to_string(),
                    instance_count: 1,
                    market: None,
                },
                InstanceGroupSpec {
                    name: "core".to_string(),
                    role: "CORE".to_string(),
                    instance_type: "m5.xlarge".to_string(),
                    instance_count: 2,
                    market: None,
                },
            ],
            scaling: None,
        })
        .expose_override(
            "instanceCount",
            OverrideSpec::new("Instances.InstanceGroups.1.InstanceCount".parse().unwrap())
                .with_bounds(1.0, 10.0),
        )
        .build()
        .unwrap();
    store.save_configuration(&configuration).await.unwrap();

    let mut function = LaunchFunction::new(
        "default",
        "basic",
        TemplateRef::new("default", "secure"),
        TemplateRef::new("default", "basic"),
    );
    function.success_target = Some("ops-success".to_string());
    function.failure_target = Some("ops-failure".to_string());
    function.wait_for_completion = wait_for_completion;
    store.save_function(&function).await.unwrap();
}

/// Pipeline wired to the given mocks with test-friendly timings
pub fn test_pipeline(
    clusters: Arc<ScriptedClusterApi>,
    notifier: Arc<RecordingNotifier>,
) -> (TemplateStore, LaunchPipeline) {
    let store = TemplateStore::new(Arc::new(InMemoryRegistry::new()));
    let pipeline = LaunchPipeline::new(
        store.clone(),
        clusters,
        notifier,
        PipelineSettings {
            retry: RetryPolicy::immediate(2),
            poll_interval: Duration::from_millis(5),
        },
    );
    (store, pipeline)
}
