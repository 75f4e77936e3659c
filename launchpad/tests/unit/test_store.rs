//! File-backed records survive a restart

use std::sync::Arc;

use launchpad::app::options::AppOptions;
use launchpad::app::state::AppState;
use launchpad::cloud::simulated::SimulatedCloud;
use launchpad::cloud::CloudClients;
use launchpad::storage::layout::StorageLayout;
use launchpad::store::FileRecordStore;
use launchpad_models::DeploymentStatus;

use crate::common::Harness;

fn file_backed(harness: &Harness, cloud: Arc<SimulatedCloud>) -> AppState {
    let layout = StorageLayout::new(harness.dir.path());
    let store = Arc::new(FileRecordStore::new(layout.records_dir()));
    let options = AppOptions {
        layout,
        stale_after: None,
        ..Default::default()
    };
    AppState::assemble(&options, store, CloudClients::simulated(cloud))
}

#[tokio::test]
async fn test_records_survive_restart() {
    let harness = Harness::new();
    let cloud = harness.cloud.clone();

    let first = file_backed(&harness, cloud.clone());
    first
        .orchestrator
        .orchestrate(harness.backend_request("durable"))
        .await
        .unwrap();
    while first.active.contains("durable") {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    let before = first.records.get("durable").await.unwrap().unwrap();
    assert_eq!(before.status, DeploymentStatus::Completed);
    drop(first);

    let second = file_backed(&harness, cloud);
    let after = second
        .query
        .get_deployment_status("durable")
        .await
        .unwrap()
        .into_record()
        .unwrap();
    assert_eq!(after.status, DeploymentStatus::Completed);
    assert_eq!(after.outputs, before.outputs);
    assert_eq!(after.progress_log.len(), before.progress_log.len());
    assert_eq!(after.attempt_id, before.attempt_id);
}
