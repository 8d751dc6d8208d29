//! Completion protocol scenarios driven through the status poller

mod common;

use common::*;
use launchpad::core::error::LaunchError;
use launchpad::pipeline::LaunchInput;
use launchpad::provision::ClusterStatus;
use std::sync::Arc;

#[tokio::test]
async fn test_concurrent_waits_resolve_independently() {
    let clusters = Arc::new(ScriptedClusterApi::with_script(vec![
        ClusterStatus::Starting,
        ClusterStatus::Running,
        ClusterStatus::Waiting,
    ]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (store, pipeline) = test_pipeline(clusters, notifier);
    seed_basic_templates(&store, true).await;
    pipeline.spawn_poller();
    let pipeline = Arc::new(pipeline);

    let mut first = LaunchInput::new("default", "basic");
    first.cluster_name = Some("basic-a".to_string());
    let mut second = LaunchInput::new("default", "basic");
    second.cluster_name = Some("basic-b".to_string());

    let (a, b) = tokio::join!(
        pipeline.run(first),
        pipeline.run(second),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.cluster_id, b.cluster_id);
    assert!(a.outcome.is_some());
    assert!(b.outcome.is_some());
    assert_eq!(pipeline.tracker().outstanding().await, 0);
}

#[tokio::test]
async fn test_failed_cluster_fails_the_wait() {
    let clusters = Arc::new(ScriptedClusterApi::with_script(vec![
        ClusterStatus::Starting,
        ClusterStatus::Bootstrapping,
        ClusterStatus::TerminatedWithErrors,
    ]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (store, pipeline) = test_pipeline(clusters.clone(), notifier.clone());
    seed_basic_templates(&store, true).await;
    pipeline.spawn_poller();

    let err = pipeline
        .run(LaunchInput::new("default", "basic"))
        .await
        .unwrap_err();

    match err {
        LaunchError::Completion { code, .. } => {
            assert_eq!(code, "TERMINATED_WITH_ERRORS");
        }
        other => panic!("expected completion failure, got {}", other),
    }
    assert_eq!(clusters.create_count(), 1, "failure happened after creation");
    assert_eq!(pipeline.tracker().outstanding().await, 0);

    // The failed wait takes the terminal transition: the failure target
    // hears about it, the success target never does
    let failures = notifier.messages_to("ops-failure");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].1.contains("TERMINATED_WITH_ERRORS"));
    assert!(notifier.messages_to("ops-success").is_empty());
}

#[tokio::test]
async fn test_requested_termination_completes_cleanly() {
    let clusters = Arc::new(ScriptedClusterApi::with_script(vec![
        ClusterStatus::Starting,
        ClusterStatus::Starting,
        ClusterStatus::Starting,
        ClusterStatus::Starting,
        ClusterStatus::Terminating,
        ClusterStatus::Terminated,
    ]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (store, pipeline) = test_pipeline(clusters.clone(), notifier);
    seed_basic_templates(&store, true).await;
    pipeline.spawn_poller();
    let pipeline = Arc::new(pipeline);

    // Terminate as soon as the cluster id is known
    let terminator = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            loop {
                let ids = pipeline.tracker().tracked_ids().await;
                if let Some(id) = ids.first() {
                    pipeline.terminate(id).await.unwrap();
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            }
        })
    };

    let report = pipeline
        .run(LaunchInput::new("default", "basic"))
        .await
        .unwrap();
    terminator.await.unwrap();

    assert!(report.outcome.is_some(), "requested termination is a clean end");
    assert_eq!(clusters.terminated.lock().unwrap().len(), 1);
    assert_eq!(pipeline.tracker().outstanding().await, 0);
}
