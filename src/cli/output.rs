//! CLI output formatting

use crate::pipeline::LaunchEvent;
use crate::provision::ClusterStatus;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Spinner shown while a launch waits for async completion
pub fn create_wait_spinner(cluster_id: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    spinner.set_message(format!("waiting for cluster {}", cluster_id));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a cluster status for display
pub fn format_status(status: ClusterStatus) -> String {
    match status {
        ClusterStatus::Starting | ClusterStatus::Bootstrapping => {
            style(status.to_string()).yellow().to_string()
        }
        ClusterStatus::Running | ClusterStatus::Waiting => {
            style(status.to_string()).green().to_string()
        }
        ClusterStatus::Terminating => style(status.to_string()).dim().to_string(),
        ClusterStatus::Terminated => style(status.to_string()).dim().to_string(),
        ClusterStatus::TerminatedWithErrors => style(status.to_string()).red().to_string(),
    }
}

/// Format a launch event for display
pub fn format_launch_event(event: &LaunchEvent) -> String {
    match event {
        LaunchEvent::LaunchStarted {
            execution_id,
            function,
        } => format!(
            "{} Launching {} ({})",
            ROCKET,
            style(function).bold(),
            style(&execution_id.to_string()[..8]).dim()
        ),
        LaunchEvent::StageStarted { stage } => {
            format!("{} {}", INFO, style(stage.name()).cyan())
        }
        LaunchEvent::StageCompleted { stage } => {
            format!("{} {}", CHECK, style(stage.name()).green())
        }
        LaunchEvent::ClusterCreated { cluster_id, .. } => {
            format!("{} Cluster created: {}", ROCKET, style(cluster_id).bold())
        }
        LaunchEvent::LaunchSucceeded { cluster_id, .. } => {
            format!(
                "{} Launch {} ({})",
                CHECK,
                style("succeeded").green(),
                style(cluster_id).bold()
            )
        }
        LaunchEvent::LaunchFailed { stage, error, .. } => {
            format!(
                "{} Launch failed at {}: {}",
                CROSS,
                style(stage.name()).yellow(),
                style(error).red()
            )
        }
    }
}
