//! Async completion protocol
//!
//! Cluster creation finishes out-of-band: the creation call returns long
//! before the cluster is usable. A continuation token correlates the
//! creation request with the later status signal, and the tracker resolves
//! each token exactly once.

pub mod poller;
pub mod tracker;

pub use poller::{PollSwitch, StatusPoller};
pub use tracker::{CompletionTracker, NoopPollControl, PollControl};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

/// Opaque handle correlating a creation request with its completion signal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContinuationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a continuation ended
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionOutcome {
    Success(Value),
    Failure { code: String, cause: String },
}

/// Error talking to the continuation backend
#[derive(Debug, Error)]
#[error("completion backend error: {0}")]
pub struct CompletionError(pub String);

/// The continuation/callback backend boundary
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Keep-alive while a creation is still in progress
    async fn send_heartbeat(&self, token: &ContinuationToken) -> Result<(), CompletionError>;

    /// Resolve the continuation successfully with the observed payload
    async fn resolve_success(
        &self,
        token: &ContinuationToken,
        payload: Value,
    ) -> Result<(), CompletionError>;

    /// Resolve the continuation as failed
    async fn resolve_failure(
        &self,
        token: &ContinuationToken,
        error_code: &str,
        cause: &str,
    ) -> Result<(), CompletionError>;
}

/// In-process backend that lets a caller block on a continuation
///
/// Each waiter registers a oneshot channel under its token; resolution
/// sends exactly one outcome through it.
pub struct LocalCompletion {
    waiters: Mutex<HashMap<String, oneshot::Sender<CompletionOutcome>>>,
}

impl LocalCompletion {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Register interest in a token before the creation call is issued
    pub async fn register_waiter(
        &self,
        token: &ContinuationToken,
    ) -> oneshot::Receiver<CompletionOutcome> {
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock().await;
        waiters.insert(token.as_str().to_string(), tx);
        rx
    }

    /// Drop interest in a token that will never be awaited
    pub async fn unregister_waiter(&self, token: &ContinuationToken) {
        self.waiters.lock().await.remove(token.as_str());
    }

    /// Number of registered waiters still unresolved
    pub async fn pending_waiters(&self) -> usize {
        self.waiters.lock().await.len()
    }

    async fn resolve(&self, token: &ContinuationToken, outcome: CompletionOutcome) {
        let sender = {
            let mut waiters = self.waiters.lock().await;
            waiters.remove(token.as_str())
        };
        if let Some(sender) = sender {
            // A dropped receiver just means nobody is waiting any more
            let _ = sender.send(outcome);
        }
    }
}

impl Default for LocalCompletion {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionBackend for LocalCompletion {
    async fn send_heartbeat(&self, _token: &ContinuationToken) -> Result<(), CompletionError> {
        // In-process waits have no watchdog to appease
        Ok(())
    }

    async fn resolve_success(
        &self,
        token: &ContinuationToken,
        payload: Value,
    ) -> Result<(), CompletionError> {
        self.resolve(token, CompletionOutcome::Success(payload)).await;
        Ok(())
    }

    async fn resolve_failure(
        &self,
        token: &ContinuationToken,
        error_code: &str,
        cause: &str,
    ) -> Result<(), CompletionError> {
        self.resolve(
            token,
            CompletionOutcome::Failure {
                code: error_code.to_string(),
                cause: cause.to_string(),
            },
        )
        .await;
        Ok(())
    }
}
