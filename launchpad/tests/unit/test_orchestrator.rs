//! Orchestrator tests against the simulated cloud

use launchpad::errors::DeployError;
use launchpad_models::{DeploymentStatus, StepName};

use crate::common::{domain_config, dynamodb_config, Harness};

#[tokio::test]
async fn test_backend_deploy_completes() {
    let harness = Harness::new();
    let request = harness.backend_request("orders");

    let accepted = harness.state.orchestrator.orchestrate(request).await.unwrap();
    assert_eq!(accepted.status, DeploymentStatus::InProgress);
    assert!(accepted.attempt_id.is_some());
    // Declared resources are known before the stack reports them
    assert_eq!(accepted.resources[0].logical_id, "ApiFunction");
    assert_eq!(accepted.resources[0].status, "PENDING");

    let record = harness.wait_finished("orders").await;
    assert_eq!(record.status, DeploymentStatus::Completed);
    assert!(record.outputs["ApiUrl"].starts_with("https://"));
    assert!(record.stack_id.is_some());
    assert_eq!(record.resources[0].status, "CREATE_COMPLETE");
    assert!(record.error.is_none());
    assert!(record
        .progress_log
        .last()
        .unwrap()
        .message
        .contains("Deployment finished"));
}

#[tokio::test]
async fn test_rendered_template_lands_in_work_dir() {
    let harness = Harness::new();
    harness
        .state
        .orchestrator
        .orchestrate(harness.backend_request("render"))
        .await
        .unwrap();
    harness.wait_finished("render").await;

    let rendered = harness.dir.path().join("work/render/template.yaml");
    let contents = std::fs::read_to_string(rendered).unwrap();
    assert!(contents.contains("Description: render-stack"));
}

#[tokio::test]
async fn test_stack_failure_fails_without_steps() {
    let harness = Harness::new();
    harness.cloud.fail_stack_apply(1, "Template format error");
    let mut request = harness.fullstack_request("broken");
    request.database_configuration = Some(dynamodb_config());

    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let record = harness.wait_finished("broken").await;

    assert_eq!(record.status, DeploymentStatus::Failed);
    let error = record.error.as_ref().unwrap();
    assert_eq!(error.kind, "stack_apply");
    assert_eq!(error.details["exitCode"], "1");
    assert!(error.details["stderr"].contains("Template format error"));
    assert!(record.stack_id.is_none());
    assert!(!record
        .progress_log
        .iter()
        .any(|entry| entry.message.starts_with("Starting step")));
}

#[tokio::test]
async fn test_backend_only_never_partial() {
    let harness = Harness::new();
    harness.state.orchestrator.orchestrate(harness.backend_request("plain")).await.unwrap();
    let record = harness.wait_finished("plain").await;
    assert_eq!(record.status, DeploymentStatus::Completed);
    assert!(harness
        .state
        .orchestrator
        .plan_names(&harness.backend_request("plain"))
        .is_empty());
}

#[tokio::test]
async fn test_failed_optional_step_is_partial() {
    let harness = Harness::new();
    harness.cloud.fail("create_table", "LimitExceededException");
    let mut request = harness.backend_request("shop");
    request.database_configuration = Some(dynamodb_config());

    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let record = harness.wait_finished("shop").await;

    assert_eq!(record.status, DeploymentStatus::Partial);
    // Base stack outputs survive the step failure
    assert!(record.outputs.contains_key("ApiUrl"));
    let error = record.error.as_ref().unwrap();
    assert_eq!(error.kind, "step");
    assert_eq!(error.failed_steps, vec!["database".to_string()]);
    assert!(error.details["database"].contains("LimitExceededException"));
    assert_eq!(record.resource("Database").unwrap().status, "FAILED");
}

#[tokio::test]
async fn test_database_step_adds_connection_info() {
    let harness = Harness::new();
    let mut request = harness.backend_request("ledger");
    request.database_configuration = Some(dynamodb_config());

    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let record = harness.wait_finished("ledger").await;

    assert_eq!(record.status, DeploymentStatus::Completed);
    assert_eq!(record.outputs["DatabaseEngine"], "dynamodb");
    assert_eq!(record.outputs["DatabaseTableName"], "ledger-table");
    assert_eq!(record.resource("Database").unwrap().status, "PROVISIONED");
}

#[tokio::test]
async fn test_fullstack_with_domain() {
    let harness = Harness::new();
    let mut request = harness.fullstack_request("storefront");
    request.domain_configuration = Some(domain_config("shop.example.com", Some("Z123")));

    let plan = harness.state.orchestrator.plan_names(&request);
    assert_eq!(
        plan,
        vec![vec![StepName::FrontendUpload], vec![StepName::CustomDomain]]
    );

    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let record = harness.wait_finished("storefront").await;

    assert_eq!(record.status, DeploymentStatus::Completed, "{:?}", record.error);
    assert_eq!(record.outputs["CustomDomainUrl"], "https://shop.example.com");
    assert!(record.outputs["FrontendUrl"].contains("cloudfront.net"));
    assert!(record.outputs.contains_key("CertificateArn"));

    let distribution_id = &record.outputs["CloudFrontDistributionId"];
    let config = harness.cloud.distribution_config(distribution_id).unwrap();
    assert_eq!(config["Aliases"]["Items"][0], "shop.example.com");
    // Validation CNAME plus the alias record
    assert_eq!(harness.cloud.dns_records("Z123").len(), 2);
}

#[tokio::test]
async fn test_second_deploy_rejected_while_running() {
    let harness = Harness::new();
    let mut request = harness.fullstack_request("busy");
    request.domain_configuration = Some(domain_config("busy.example.com", None));

    harness.state.orchestrator.orchestrate(request.clone()).await.unwrap();
    let second = harness.state.orchestrator.orchestrate(request).await;
    assert!(matches!(second, Err(DeployError::AlreadyInProgress(_))));

    harness.wait_finished("busy").await;
}

#[tokio::test]
async fn test_invalid_request_writes_nothing() {
    let harness = Harness::new();
    let mut request = harness.backend_request("9lives");
    request.framework = "rails".to_string();

    let result = harness.state.orchestrator.orchestrate(request).await;
    match result {
        Err(DeployError::ValidationError(message)) => {
            assert!(message.contains("must start with a letter"));
            assert!(message.contains("rails"));
        }
        other => panic!("expected validation error, got {:?}", other),
    }
    assert!(harness.state.records.get("9lives").await.unwrap().is_none());
    assert!(!harness.state.active.contains("9lives"));
}

#[tokio::test]
async fn test_missing_template_is_rejected() {
    let harness = Harness::new();
    std::fs::remove_dir_all(harness.dir.path().join("templates/frontend")).unwrap();

    let result = harness
        .state
        .orchestrator
        .orchestrate(harness.frontend_request("site"))
        .await;
    assert!(matches!(result, Err(DeployError::TemplateNotFound { .. })));
    assert!(harness.state.records.get("site").await.unwrap().is_none());
}

#[tokio::test]
async fn test_redeploy_replaces_attempt() {
    let harness = Harness::new();
    harness.cloud.fail_stack_apply(2, "Rate exceeded");
    harness.state.orchestrator.orchestrate(harness.backend_request("retry")).await.unwrap();
    let failed = harness.wait_finished("retry").await;
    assert_eq!(failed.status, DeploymentStatus::Failed);

    harness.cloud.heal("stack_apply");
    harness.state.orchestrator.orchestrate(harness.backend_request("retry")).await.unwrap();
    let record = harness.wait_finished("retry").await;

    assert_eq!(record.status, DeploymentStatus::Completed);
    assert!(record.error.is_none());
    assert_ne!(record.attempt_id, failed.attempt_id);
    // History of both attempts is kept
    assert!(record.progress_log.len() > failed.progress_log.len());
    assert_eq!(record.created_at, failed.created_at);
}
