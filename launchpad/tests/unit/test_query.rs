//! Query service tests

use std::time::Duration;

use launchpad::query::DeploymentLookup;
use launchpad_models::DeploymentStatus;

use crate::common::Harness;

#[tokio::test]
async fn test_unknown_project_is_not_found() {
    let harness = Harness::new();
    let lookup = harness.state.query.get_deployment_status("nowhere").await.unwrap();
    assert_eq!(lookup.status(), DeploymentStatus::NotFound);
    assert!(lookup.into_record().is_none());
}

#[tokio::test]
async fn test_fresh_record_served_as_stored() {
    let harness = Harness::new();
    harness.state.orchestrator.orchestrate(harness.backend_request("api")).await.unwrap();
    harness.wait_finished("api").await;
    harness.cloud.set_stack_status("api-stack", "DELETE_COMPLETE");

    // Refresh on read is disabled in this harness
    let lookup = harness.state.query.get_deployment_status("api").await.unwrap();
    assert_eq!(lookup.status(), DeploymentStatus::Completed);

    let refreshed = harness.state.query.refresh("api").await.unwrap();
    assert_eq!(refreshed.status, DeploymentStatus::Deleted);
}

#[tokio::test]
async fn test_stale_record_refreshed_on_read() {
    let harness = Harness::with_stale_after(Some(Duration::ZERO));
    harness.state.orchestrator.orchestrate(harness.backend_request("old")).await.unwrap();
    harness.wait_finished("old").await;
    harness.cloud.set_stack_status("old-stack", "UPDATE_ROLLBACK_COMPLETE");
    tokio::time::sleep(Duration::from_millis(5)).await;

    let lookup = harness.state.query.get_deployment_status("old").await.unwrap();
    assert_eq!(lookup.status(), DeploymentStatus::Failed);
}

#[tokio::test]
async fn test_refresh_failure_serves_stored_record() {
    let harness = Harness::with_stale_after(Some(Duration::ZERO));
    harness.state.orchestrator.orchestrate(harness.backend_request("cached")).await.unwrap();
    harness.wait_finished("cached").await;
    harness.cloud.fail("describe_stack", "Throttling");
    tokio::time::sleep(Duration::from_millis(5)).await;

    match harness.state.query.get_deployment_status("cached").await.unwrap() {
        DeploymentLookup::Found(record) => assert_eq!(record.status, DeploymentStatus::Completed),
        DeploymentLookup::NotFound(_) => panic!("record should be served"),
    }
}

#[tokio::test]
async fn test_list_is_ordered_by_project() {
    let harness = Harness::new();
    for project in ["zeta", "alpha", "mid"] {
        harness
            .state
            .orchestrator
            .orchestrate(harness.backend_request(project))
            .await
            .unwrap();
        harness.wait_finished(project).await;
    }

    let names: Vec<String> = harness
        .state
        .query
        .list_deployments()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.project_name)
        .collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}
