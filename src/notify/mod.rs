//! Notification sink boundary

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Error publishing a notification
#[derive(Debug, Error)]
#[error("publish to '{target}' failed: {cause}")]
pub struct NotifyError {
    pub target: String,
    pub cause: String,
}

/// Trait for notification sinks
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Publish a message to a named target
    async fn publish(&self, target: &str, subject: &str, message: &str) -> Result<(), NotifyError>;
}

/// Notifier that writes to the log (default when no sink is wired up)
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, target: &str, subject: &str, message: &str) -> Result<(), NotifyError> {
        info!("notification to {}: {} - {}", target, subject, message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_accepts_publish() {
        let notifier = LogNotifier;
        notifier
            .publish("ops-channel", "launch succeeded", "cluster j-123")
            .await
            .unwrap();
    }
}
