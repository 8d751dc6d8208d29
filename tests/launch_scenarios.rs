//! Launch pipeline scenarios with scripted collaborators

mod common;

use common::*;
use launchpad::core::error::LaunchError;
use launchpad::pipeline::LaunchInput;
use launchpad::provision::{ClusterStatus, ClusterSummary};
use serde_json::{json, Value};
use std::sync::Arc;

/// The end-to-end happy path: override applied within bounds, guard passes,
/// cluster observed WAITING, success notification carries the cluster id
#[tokio::test]
async fn test_basic_launch_with_override() {
    let clusters = Arc::new(ScriptedClusterApi::with_script(vec![
        ClusterStatus::Starting,
        ClusterStatus::Running,
        ClusterStatus::Running,
        ClusterStatus::Waiting,
    ]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (store, pipeline) = test_pipeline(clusters.clone(), notifier.clone());
    seed_basic_templates(&store, true).await;
    pipeline.spawn_poller();

    let input = LaunchInput::new("default", "basic").with_override("instanceCount", json!(4));
    let report = pipeline.run(input).await.unwrap();

    assert_eq!(report.cluster_id, "j-0001");
    assert!(report.outcome.is_some(), "waited run must carry an outcome");
    assert_eq!(pipeline.tracker().outstanding().await, 0);

    // The creation request carries the override and no null fields
    let created = clusters.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    let request = &created[0];
    assert_eq!(
        request["Instances"]["InstanceGroups"][1]["InstanceCount"],
        json!(4)
    );
    assert_eq!(request["ServiceRole"], json!("service-role"));
    assert_eq!(request["LogUri"], json!("s3://logs/clusters/"));
    assert!(!contains_null(request), "stripped request must have no nulls");

    // Run metadata and success notification
    let tags = request["Tags"].as_array().unwrap();
    assert!(tags
        .iter()
        .any(|t| t["Key"] == json!("launchpad:function") && t["Value"] == json!("default/basic")));

    let successes = notifier.messages_to("ops-success");
    assert_eq!(successes.len(), 1);
    assert!(successes[0].1.contains("j-0001"));
    assert!(notifier.messages_to("ops-failure").is_empty());
}

#[tokio::test]
async fn test_unknown_override_fails_before_creation() {
    let clusters = Arc::new(ScriptedClusterApi::with_script(vec![ClusterStatus::Waiting]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (store, pipeline) = test_pipeline(clusters.clone(), notifier.clone());
    seed_basic_templates(&store, false).await;

    let input = LaunchInput::new("default", "basic").with_override("subnetId", json!("subnet-9"));
    let err = pipeline.run(input).await.unwrap_err();

    assert!(matches!(err, LaunchError::InvalidOverride(_)));
    assert!(err.to_string().contains("subnetId"));
    assert_eq!(clusters.create_count(), 0, "no resource may exist");

    let failures = notifier.messages_to("ops-failure");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].1.contains("resolve-overrides"));
}

#[tokio::test]
async fn test_out_of_bounds_override_rejected() {
    let clusters = Arc::new(ScriptedClusterApi::with_script(vec![ClusterStatus::Waiting]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (store, pipeline) = test_pipeline(clusters.clone(), notifier.clone());
    seed_basic_templates(&store, false).await;

    let input = LaunchInput::new("default", "basic").with_override("instanceCount", json!(11));
    let err = pipeline.run(input).await.unwrap_err();

    assert!(matches!(err, LaunchError::InvalidOverride(_)));
    assert_eq!(clusters.create_count(), 0);
}

#[tokio::test]
async fn test_running_guard_blocks_duplicate_name() {
    let clusters = Arc::new(
        ScriptedClusterApi::with_script(vec![ClusterStatus::Waiting]).with_active(ClusterSummary {
            id: "j-OLD".to_string(),
            name: "basic".to_string(),
            status: ClusterStatus::Running,
        }),
    );
    let notifier = Arc::new(RecordingNotifier::default());
    let (store, pipeline) = test_pipeline(clusters.clone(), notifier.clone());
    seed_basic_templates(&store, false).await;

    let err = pipeline
        .run(LaunchInput::new("default", "basic"))
        .await
        .unwrap_err();
    assert!(matches!(err, LaunchError::AlreadyRunning(_)));
    assert_eq!(clusters.create_count(), 0);

    // The same run goes through once the guard is waived
    let mut input = LaunchInput::new("default", "basic");
    input.fail_if_running = Some(false);
    let report = pipeline.run(input).await.unwrap();
    assert_eq!(report.cluster_id, "j-0001");
}

#[tokio::test]
async fn test_missing_function_reports_not_found() {
    let clusters = Arc::new(ScriptedClusterApi::with_script(vec![ClusterStatus::Waiting]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (store, pipeline) = test_pipeline(clusters, notifier.clone());
    seed_basic_templates(&store, false).await;

    let err = pipeline
        .run(LaunchInput::new("default", "absent"))
        .await
        .unwrap_err();
    assert!(matches!(err, LaunchError::NotFound { .. }));

    // Nothing was loaded, so there is no failure target to notify
    assert!(notifier.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_caller_tags_win_over_run_metadata() {
    let clusters = Arc::new(ScriptedClusterApi::with_script(vec![ClusterStatus::Waiting]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (store, pipeline) = test_pipeline(clusters.clone(), notifier);
    seed_basic_templates(&store, false).await;

    let input = LaunchInput::new("default", "basic")
        .with_tag("launchpad:function", "overridden")
        .with_tag("team", "data-eng");
    pipeline.run(input).await.unwrap();

    let created = clusters.created.lock().unwrap();
    let tags = created[0]["Tags"].as_array().unwrap();
    let value_of = |key: &str| {
        tags.iter()
            .find(|t| t["Key"] == json!(key))
            .map(|t| t["Value"].clone())
    };
    assert_eq!(value_of("launchpad:function"), Some(json!("overridden")));
    assert_eq!(value_of("team"), Some(json!("data-eng")));
    // Merge is an upsert, never a duplicate append
    assert_eq!(
        tags.iter()
            .filter(|t| t["Key"] == json!("launchpad:function"))
            .count(),
        1
    );
}

fn contains_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.iter().any(contains_null),
        Value::Object(map) => map.values().any(contains_null),
        _ => false,
    }
}
