//! Frontend upload tests

use launchpad_models::{DeploymentRecord, DeploymentStatus};

use crate::common::Harness;

fn last_sync_summary(record: &DeploymentRecord) -> &str {
    record
        .progress_log
        .iter()
        .rev()
        .map(|entry| entry.message.as_str())
        .find(|message| message.starts_with("Uploaded "))
        .unwrap()
}

#[tokio::test]
async fn test_unchanged_assets_skip_invalidation() {
    let harness = Harness::new();
    let request = harness.frontend_request("landing");

    harness.state.orchestrator.orchestrate(request.clone()).await.unwrap();
    let first = harness.wait_finished("landing").await;
    assert_eq!(first.status, DeploymentStatus::Completed);

    let bucket = first.outputs["FrontendBucketName"].clone();
    assert_eq!(harness.cloud.bucket_objects(&bucket).len(), 2);
    assert_eq!(harness.cloud.invalidations().len(), 1);
    assert_eq!(harness.cloud.invalidations()[0].1, vec!["/*".to_string()]);

    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let second = harness.wait_finished("landing").await;
    assert_eq!(second.status, DeploymentStatus::Completed);
    assert_eq!(harness.cloud.invalidations().len(), 1);
    assert_eq!(
        last_sync_summary(&second),
        "Uploaded 0 files, deleted 0 stale files"
    );
    assert_eq!(harness.cloud.bucket_objects(&bucket).len(), 2);
}

#[tokio::test]
async fn test_removed_assets_are_deleted_from_bucket() {
    let harness = Harness::new();
    let request = harness.frontend_request("gallery");

    harness.state.orchestrator.orchestrate(request.clone()).await.unwrap();
    let first = harness.wait_finished("gallery").await;
    let bucket = first.outputs["FrontendBucketName"].clone();
    assert!(harness.cloud.bucket_objects(&bucket).contains_key("assets/app.js"));

    let assets = request.frontend_configuration.as_ref().unwrap().assets_dir();
    std::fs::remove_file(assets.join("assets/app.js")).unwrap();

    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let second = harness.wait_finished("gallery").await;
    assert_eq!(second.status, DeploymentStatus::Completed);

    let keys: Vec<String> = harness.cloud.bucket_objects(&bucket).into_keys().collect();
    assert_eq!(keys, vec!["index.html".to_string()]);
    assert_eq!(
        last_sync_summary(&second),
        "Uploaded 0 files, deleted 1 stale files"
    );
    // A deletion is a change, so the cache is invalidated again
    assert_eq!(harness.cloud.invalidations().len(), 2);
}

#[tokio::test]
async fn test_changed_assets_invalidate_again() {
    let harness = Harness::new();
    let request = harness.frontend_request("blog");

    harness.state.orchestrator.orchestrate(request.clone()).await.unwrap();
    harness.wait_finished("blog").await;

    let assets = request.frontend_configuration.as_ref().unwrap().assets_dir();
    std::fs::write(assets.join("index.html"), "<h1>v2</h1>").unwrap();

    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let record = harness.wait_finished("blog").await;
    assert_eq!(record.status, DeploymentStatus::Completed);
    assert_eq!(harness.cloud.invalidations().len(), 2);
}

#[tokio::test]
async fn test_invalidation_failure_is_partial() {
    let harness = Harness::new();
    harness.cloud.fail("invalidate", "TooManyInvalidationsInProgress");

    harness
        .state
        .orchestrator
        .orchestrate(harness.frontend_request("docs"))
        .await
        .unwrap();
    let record = harness.wait_finished("docs").await;

    assert_eq!(record.status, DeploymentStatus::Partial);
    // Assets were uploaded before the invalidation failed
    assert!(record.outputs.contains_key("FrontendUrl"));
    let error = record.error.as_ref().unwrap();
    assert_eq!(error.failed_steps, vec!["frontend_upload".to_string()]);
}
