//! Exactly-once completion tracking
//!
//! The tracker owns the poll-target set: a mutex-guarded map from cluster
//! id to wait metadata. Registration enables the poll mechanism, resolution
//! removes the target, and the mechanism is disabled only when the tracked
//! count reaches zero. Late status updates for an already-resolved token
//! are ignored.

use crate::completion::{CompletionBackend, CompletionError, ContinuationToken};
use crate::provision::ClusterStatus;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Enable/disable hook for the polling mechanism
#[async_trait]
pub trait PollControl: Send + Sync {
    async fn enable(&self);
    async fn disable(&self);
}

/// Control for deployments where status signals arrive by subscription
pub struct NoopPollControl;

#[async_trait]
impl PollControl for NoopPollControl {
    async fn enable(&self) {}
    async fn disable(&self) {}
}

/// Wait metadata for one outstanding creation
#[derive(Debug, Clone)]
struct WaitEntry {
    token: ContinuationToken,
    expected: ClusterStatus,
    termination_requested: bool,
}

/// Correlates status updates with continuation tokens, exactly once each
pub struct CompletionTracker {
    backend: Arc<dyn CompletionBackend>,
    entries: Mutex<HashMap<String, WaitEntry>>,
    poll: Arc<dyn PollControl>,
}

impl CompletionTracker {
    pub fn new(backend: Arc<dyn CompletionBackend>, poll: Arc<dyn PollControl>) -> Self {
        Self {
            backend,
            entries: Mutex::new(HashMap::new()),
            poll,
        }
    }

    /// Number of creations currently outstanding
    pub async fn outstanding(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Cluster ids currently being watched
    pub async fn tracked_ids(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }

    /// Start watching a creation; arms the poll mechanism if it was idle
    pub async fn register(
        &self,
        cluster_id: &str,
        token: ContinuationToken,
        expected: ClusterStatus,
    ) {
        let was_empty = {
            let mut entries = self.entries.lock().await;
            let was_empty = entries.is_empty();
            entries.insert(
                cluster_id.to_string(),
                WaitEntry {
                    token,
                    expected,
                    termination_requested: false,
                },
            );
            was_empty
        };
        if was_empty {
            self.poll.enable().await;
        }
        debug!("watching cluster {} for {}", cluster_id, expected);
    }

    /// Record caller intent ahead of the terminate call, so the later
    /// terminal status is treated as a clean completion
    pub async fn mark_termination_requested(&self, cluster_id: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(cluster_id) {
            entry.termination_requested = true;
        }
    }

    /// Feed one observed status update through the protocol
    ///
    /// Exactly one resolution happens per token; updates for clusters that
    /// are no longer tracked are ignored.
    pub async fn handle_status(
        &self,
        cluster_id: &str,
        status: ClusterStatus,
        payload: Value,
    ) -> Result<(), CompletionError> {
        // Decide under the lock, call the backend outside it
        let action = {
            let mut entries = self.entries.lock().await;
            let Some(entry) = entries.remove(cluster_id) else {
                debug!("ignoring status {} for untracked cluster {}", status, cluster_id);
                return Ok(());
            };

            if status == entry.expected {
                Action::Succeed(entry.token)
            } else if status.is_terminal() {
                if entry.termination_requested && !status.is_failure() {
                    // Caller asked for this termination; not an error
                    Action::Succeed(entry.token)
                } else {
                    Action::Fail(entry.token)
                }
            } else {
                let token = entry.token.clone();
                entries.insert(cluster_id.to_string(), entry);
                Action::Heartbeat(token)
            }
        };

        match action {
            Action::Heartbeat(token) => {
                self.backend.send_heartbeat(&token).await?;
                Ok(())
            }
            Action::Succeed(token) => {
                info!("cluster {} reached {}", cluster_id, status);
                let result = self.backend.resolve_success(&token, payload).await;
                if let Err(err) = result {
                    // Never leave a token nobody will complete
                    warn!("success resolution failed for {}: {}", token, err);
                    let _ = self
                        .backend
                        .resolve_failure(&token, "RESOLUTION_ERROR", &err.to_string())
                        .await;
                    self.disarm_if_idle().await;
                    return Err(err);
                }
                self.disarm_if_idle().await;
                Ok(())
            }
            Action::Fail(token) => {
                warn!("cluster {} ended in {}", cluster_id, status);
                let result = self
                    .backend
                    .resolve_failure(&token, &status.to_string(), &payload.to_string())
                    .await;
                self.disarm_if_idle().await;
                result
            }
        }
    }

    /// Resolve a tracked wait as failed outside the status flow
    /// (e.g. the describe call reports the cluster gone)
    pub async fn fail(
        &self,
        cluster_id: &str,
        code: &str,
        cause: &str,
    ) -> Result<(), CompletionError> {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries.remove(cluster_id)
        };
        let Some(entry) = entry else {
            return Ok(());
        };
        let result = self.backend.resolve_failure(&entry.token, code, cause).await;
        self.disarm_if_idle().await;
        result
    }

    async fn disarm_if_idle(&self) {
        let empty = self.entries.lock().await.is_empty();
        if empty {
            self.poll.disable().await;
        }
    }
}

enum Action {
    Heartbeat(ContinuationToken),
    Succeed(ContinuationToken),
    Fail(ContinuationToken),
}
