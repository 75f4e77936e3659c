//! Database step tests

use launchpad_models::DeploymentStatus;

use crate::common::{aurora_config, Harness};

#[tokio::test]
async fn test_aurora_cluster_provisioned() {
    let harness = Harness::new();
    let mut request = harness.backend_request("billing");
    request.database_configuration = Some(aurora_config());

    harness.state.orchestrator.orchestrate(request.clone()).await.unwrap();
    let record = harness.wait_finished("billing").await;

    assert_eq!(record.status, DeploymentStatus::Completed, "{:?}", record.error);
    assert!(harness.cloud.has_subnet_group("billing-db-subnets"));
    assert!(harness.cloud.has_cluster("billing-db"));
    assert_eq!(record.outputs["DatabaseEngine"], "aurora-postgresql");
    assert_eq!(record.outputs["DatabasePort"], "5432");
    assert!(record.outputs["DatabaseEndpoint"].starts_with("billing-db.cluster-"));
    assert!(record.outputs.contains_key("DatabaseSecretArn"));
    let entry = record.resource("Database").unwrap();
    assert_eq!(entry.resource_type, "AWS::RDS::DBCluster");
    assert_eq!(entry.status, "PROVISIONED");

    // Re-running finds every piece in place
    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let again = harness.wait_finished("billing").await;
    assert_eq!(again.status, DeploymentStatus::Completed);
    assert!(again
        .progress_log
        .iter()
        .any(|entry| entry.message == "Cluster billing-db already exists"));
}

#[tokio::test]
async fn test_aurora_network_failure_skips_cluster() {
    let harness = Harness::new();
    harness.cloud.fail("ensure_subnet_group", "DBSubnetGroupQuotaExceeded");
    let mut request = harness.backend_request("payroll");
    request.database_configuration = Some(aurora_config());

    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let record = harness.wait_finished("payroll").await;

    assert_eq!(record.status, DeploymentStatus::Partial);
    assert!(!harness.cloud.has_cluster("payroll-db"));
    assert!(record.outputs.contains_key("ApiUrl"));
    assert!(!record.outputs.contains_key("DatabaseEndpoint"));
    let error = record.error.as_ref().unwrap();
    assert_eq!(error.failed_steps, vec!["database".to_string()]);
    assert!(error.details["database"].contains("DBSubnetGroupQuotaExceeded"));
}
