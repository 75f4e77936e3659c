//! Reconciler tests

use launchpad::errors::DeployError;
use launchpad::workers::reconciler::reconcile_pass;
use launchpad_models::{DeploymentRecord, DeploymentStatus, RecordError};

use crate::common::Harness;

async fn deployed(harness: &Harness, project: &str) -> DeploymentRecord {
    harness
        .state
        .orchestrator
        .orchestrate(harness.backend_request(project))
        .await
        .unwrap();
    harness.wait_finished(project).await
}

#[tokio::test]
async fn test_reconcile_matching_stack_changes_nothing() {
    let harness = Harness::new();
    let before = deployed(&harness, "steady").await;

    let after = harness.state.reconciler.reconcile("steady").await.unwrap();
    assert_eq!(after.status, DeploymentStatus::Completed);
    assert_eq!(after.outputs, before.outputs);
    assert_eq!(after.progress_log.len(), before.progress_log.len());
}

#[tokio::test]
async fn test_out_of_band_rollback_is_failed() {
    let harness = Harness::new();
    deployed(&harness, "drift").await;
    harness
        .cloud
        .set_stack_status("drift-stack", "UPDATE_ROLLBACK_COMPLETE");

    let record = harness.state.reconciler.reconcile("drift").await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Failed);
    assert!(record
        .progress_log
        .last()
        .unwrap()
        .message
        .contains("completed -> failed"));

    let stored = harness.state.records.get("drift").await.unwrap().unwrap();
    assert_eq!(stored.progress_log.len(), record.progress_log.len());
    assert_eq!(stored.progress_log.last(), record.progress_log.last());
}

#[tokio::test]
async fn test_new_outputs_are_merged() {
    let harness = Harness::new();
    deployed(&harness, "grow").await;
    harness.cloud.set_stack_output("grow-stack", "QueueUrl", "https://sqs/queue");

    let record = harness.state.reconciler.reconcile("grow").await.unwrap();
    assert_eq!(record.outputs["QueueUrl"], "https://sqs/queue");
    assert!(record.outputs.contains_key("ApiUrl"));
}

#[tokio::test]
async fn test_query_failure_leaves_record_untouched() {
    let harness = Harness::new();
    let before = deployed(&harness, "flaky").await;
    harness.cloud.fail("describe_stack", "Throttling");

    let result = harness.state.reconciler.reconcile("flaky").await;
    assert!(matches!(result, Err(DeployError::ReconcileQueryError(_))));

    let stored = harness.state.records.get("flaky").await.unwrap().unwrap();
    assert_eq!(stored.status, before.status);
    assert_eq!(stored.last_updated, before.last_updated);
}

#[tokio::test]
async fn test_deleted_stack_is_not_found() {
    let harness = Harness::new();
    deployed(&harness, "gone").await;
    harness.cloud.delete_stack("gone-stack");

    let record = harness.state.reconciler.reconcile("gone").await.unwrap();
    assert_eq!(record.status, DeploymentStatus::NotFound);
    assert!(record.outputs.is_empty());
    assert!(record.resources.is_empty());
    assert!(record
        .progress_log
        .last()
        .unwrap()
        .message
        .contains("completed -> not_found"));
}

#[tokio::test]
async fn test_unknown_project_is_not_stored() {
    let harness = Harness::new();

    let record = harness.state.reconciler.reconcile("ghost").await.unwrap();
    assert_eq!(record.status, DeploymentStatus::NotFound);
    assert!(harness.state.records.get("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_failure_before_stack_stays_failed() {
    let harness = Harness::new();
    harness
        .state
        .records
        .upsert(
            "early",
            || DeploymentRecord::new("early", "early-stack", "us-east-1"),
            |record| {
                record.status = DeploymentStatus::Failed;
                record.error = Some(RecordError::new("stack_apply", "exit 1"));
            },
        )
        .await
        .unwrap();

    let record = harness.state.reconciler.reconcile("early").await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Failed);
    assert!(record.error.is_some());
}

#[tokio::test]
async fn test_pending_record_not_marked_missing() {
    let harness = Harness::new();
    harness
        .state
        .records
        .upsert(
            "pending",
            || DeploymentRecord::new("pending", "pending-stack", "us-east-1"),
            |record| record.status = DeploymentStatus::InProgress,
        )
        .await
        .unwrap();

    let record = harness.state.reconciler.reconcile("pending").await.unwrap();
    assert_eq!(record.status, DeploymentStatus::InProgress);
}

#[tokio::test]
async fn test_worker_pass_settles_abandoned_attempt() {
    let harness = Harness::new();
    deployed(&harness, "orphan").await;
    // A process that died mid-attempt leaves the record in progress
    harness
        .state
        .records
        .update("orphan", |record| record.status = DeploymentStatus::InProgress)
        .await
        .unwrap();

    let reconciled = reconcile_pass(
        &harness.state.records,
        &harness.state.reconciler,
        &harness.state.active,
    )
    .await;
    assert_eq!(reconciled, 1);

    let record = harness.state.records.get("orphan").await.unwrap().unwrap();
    assert_eq!(record.status, DeploymentStatus::Completed);
}

#[tokio::test]
async fn test_worker_pass_fails_attempt_without_stack() {
    let harness = Harness::new();
    harness
        .state
        .records
        .upsert(
            "stranded",
            || DeploymentRecord::new("stranded", "stranded-stack", "us-east-1"),
            |record| record.status = DeploymentStatus::InProgress,
        )
        .await
        .unwrap();

    let reconciled = reconcile_pass(
        &harness.state.records,
        &harness.state.reconciler,
        &harness.state.active,
    )
    .await;
    assert_eq!(reconciled, 1);

    let record = harness.state.records.get("stranded").await.unwrap().unwrap();
    assert_eq!(record.status, DeploymentStatus::Failed);
    assert_eq!(record.error.as_ref().unwrap().kind, "interrupted");
    assert!(record
        .progress_log
        .last()
        .unwrap()
        .message
        .contains("in_progress -> failed"));

    // A later pass leaves the settled failure alone
    let again = harness.state.reconciler.reconcile("stranded").await.unwrap();
    assert_eq!(again.status, DeploymentStatus::Failed);
}
