//! In-process cluster API
//!
//! Stands in for the real provisioning service: clusters advance one
//! lifecycle state per describe call, so a poll loop observes the same
//! progression it would see against the wire. Used by the CLI until a
//! service client is wired in, and by tests.

use crate::provision::{ClusterApi, ClusterStatus, ClusterStep, ClusterSummary, ProvisionError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

struct ClusterRecord {
    name: String,
    status: ClusterStatus,
    keep_alive: bool,
    terminate_requested: bool,
}

impl ClusterRecord {
    fn advance(&mut self) {
        self.status = match self.status {
            ClusterStatus::Starting => ClusterStatus::Bootstrapping,
            ClusterStatus::Bootstrapping => ClusterStatus::Running,
            ClusterStatus::Running if self.terminate_requested => ClusterStatus::Terminating,
            ClusterStatus::Running if self.keep_alive => ClusterStatus::Waiting,
            ClusterStatus::Running => ClusterStatus::Terminating,
            ClusterStatus::Waiting if self.terminate_requested => ClusterStatus::Terminating,
            ClusterStatus::Waiting => ClusterStatus::Waiting,
            ClusterStatus::Terminating => ClusterStatus::Terminated,
            terminal => terminal,
        };
    }
}

/// Cluster API backed by process memory
pub struct LocalClusterApi {
    clusters: Arc<RwLock<HashMap<String, ClusterRecord>>>,
    next_id: AtomicUsize,
}

impl LocalClusterApi {
    pub fn new() -> Self {
        Self {
            clusters: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicUsize::new(1),
        }
    }
}

impl Default for LocalClusterApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterApi for LocalClusterApi {
    async fn create(&self, document: &Value) -> Result<String, ProvisionError> {
        let name = document
            .get("Name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProvisionError::Validation("document has no Name".to_string()))?;
        let keep_alive = document
            .get("Instances")
            .and_then(|i| i.get("KeepJobFlowAliveWhenNoSteps"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let id = format!("j-{:08}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.clusters.write().await.insert(
            id.clone(),
            ClusterRecord {
                name: name.to_string(),
                status: ClusterStatus::Starting,
                keep_alive,
                terminate_requested: false,
            },
        );
        info!("local cluster {} created for '{}'", id, name);
        Ok(id)
    }

    async fn describe(&self, cluster_id: &str) -> Result<ClusterStatus, ProvisionError> {
        let mut clusters = self.clusters.write().await;
        let record = clusters
            .get_mut(cluster_id)
            .ok_or_else(|| ProvisionError::NotFound(cluster_id.to_string()))?;
        record.advance();
        Ok(record.status)
    }

    async fn list_active(&self) -> Result<Vec<ClusterSummary>, ProvisionError> {
        let clusters = self.clusters.read().await;
        Ok(clusters
            .iter()
            .filter(|(_, record)| !record.status.is_terminal())
            .map(|(id, record)| ClusterSummary {
                id: id.clone(),
                name: record.name.clone(),
                status: record.status,
            })
            .collect())
    }

    async fn add_step(
        &self,
        cluster_id: &str,
        step: &ClusterStep,
    ) -> Result<String, ProvisionError> {
        let clusters = self.clusters.read().await;
        let record = clusters
            .get(cluster_id)
            .ok_or_else(|| ProvisionError::NotFound(cluster_id.to_string()))?;
        if record.status.is_terminal() {
            return Err(ProvisionError::Validation(format!(
                "cluster {} is {}",
                cluster_id, record.status
            )));
        }
        info!("local step '{}' accepted on {}", step.name, cluster_id);
        Ok(format!("s-{}-{}", cluster_id, step.name))
    }

    async fn terminate(&self, cluster_id: &str) -> Result<(), ProvisionError> {
        let mut clusters = self.clusters.write().await;
        let record = clusters
            .get_mut(cluster_id)
            .ok_or_else(|| ProvisionError::NotFound(cluster_id.to_string()))?;
        record.terminate_requested = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(name: &str, keep_alive: bool) -> Value {
        json!({
            "Name": name,
            "Instances": { "KeepJobFlowAliveWhenNoSteps": keep_alive },
        })
    }

    #[tokio::test]
    async fn test_keep_alive_cluster_settles_in_waiting() {
        let api = LocalClusterApi::new();
        let id = api.create(&document("idle", true)).await.unwrap();

        let mut last = ClusterStatus::Starting;
        for _ in 0..5 {
            last = api.describe(&id).await.unwrap();
        }
        assert_eq!(last, ClusterStatus::Waiting);
    }

    #[tokio::test]
    async fn test_transient_cluster_terminates() {
        let api = LocalClusterApi::new();
        let id = api.create(&document("oneshot", false)).await.unwrap();

        let mut last = ClusterStatus::Starting;
        for _ in 0..6 {
            last = api.describe(&id).await.unwrap();
        }
        assert_eq!(last, ClusterStatus::Terminated);
    }

    #[tokio::test]
    async fn test_terminate_drains_active_listing() {
        let api = LocalClusterApi::new();
        let id = api.create(&document("victim", true)).await.unwrap();
        assert_eq!(api.list_active().await.unwrap().len(), 1);

        api.terminate(&id).await.unwrap();
        for _ in 0..8 {
            api.describe(&id).await.unwrap();
        }
        assert!(api.list_active().await.unwrap().is_empty());

        let err = api
            .add_step(
                &id,
                &ClusterStep {
                    name: "late".to_string(),
                    jar: "job.jar".to_string(),
                    args: vec![],
                    main_class: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Validation(_)));
    }
}
