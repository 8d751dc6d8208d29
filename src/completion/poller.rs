//! Status poller
//!
//! Polls the provisioning service for the status of every tracked cluster,
//! but only while at least one creation is outstanding. The tracker flips
//! the switch on registration and resolution; an idle poller parks on the
//! switch instead of spinning.

use crate::completion::tracker::{CompletionTracker, PollControl};
use crate::provision::ClusterApi;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Shared enable/disable flag the poller parks on while nothing is tracked
pub struct PollSwitch {
    enabled: AtomicBool,
    armed: Notify,
}

impl PollSwitch {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            armed: Notify::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Wait until the switch is flipped on
    pub async fn wait_enabled(&self) {
        while !self.is_enabled() {
            self.armed.notified().await;
        }
    }
}

impl Default for PollSwitch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PollControl for PollSwitch {
    async fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
        self.armed.notify_waiters();
        debug!("status polling enabled");
    }

    async fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        debug!("status polling disabled");
    }
}

/// Drives the tracker by polling cluster status on an interval
pub struct StatusPoller {
    clusters: Arc<dyn ClusterApi>,
    tracker: Arc<CompletionTracker>,
    switch: Arc<PollSwitch>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(
        clusters: Arc<dyn ClusterApi>,
        tracker: Arc<CompletionTracker>,
        switch: Arc<PollSwitch>,
        interval: Duration,
    ) -> Self {
        Self {
            clusters,
            tracker,
            switch,
            interval,
        }
    }

    /// Run one poll round over every tracked cluster
    pub async fn poll_once(&self) {
        for cluster_id in self.tracker.tracked_ids().await {
            match self.clusters.describe(&cluster_id).await {
                Ok(status) => {
                    let payload = json!({
                        "ClusterId": cluster_id,
                        "Status": status.to_string(),
                    });
                    if let Err(err) = self.tracker.handle_status(&cluster_id, status, payload).await
                    {
                        warn!("status handling for {} failed: {}", cluster_id, err);
                    }
                }
                Err(err) if err.is_transient() => {
                    // Next round will see it
                    debug!("describe {} deferred: {}", cluster_id, err);
                }
                Err(err) => {
                    warn!("cluster {} unpollable: {}", cluster_id, err);
                    if let Err(resolve_err) = self
                        .tracker
                        .fail(&cluster_id, "DESCRIBE_FAILED", &err.to_string())
                        .await
                    {
                        warn!("failure resolution for {} failed: {}", cluster_id, resolve_err);
                    }
                }
            }
        }
    }

    /// Spawn the poll loop on the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.switch.wait_enabled().await;
                self.poll_once().await;
                tokio::time::sleep(self.interval).await;
            }
        })
    }
}
