//! Custom domain step tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use launchpad::cloud::simulated::SimulatedCloud;
use launchpad::cloud::{CdnApi, CloudClients, DistributionConfig, DistributionUpdate};
use launchpad::errors::DeployError;
use launchpad_models::DeploymentStatus;
use serde_json::Value;

use crate::common::{domain_config, Harness};

/// Distribution whose ETag moves under the first `conflicts` updates
struct ContendedCdn {
    cloud: Arc<SimulatedCloud>,
    conflicts: AtomicU32,
}

impl ContendedCdn {
    fn clients(conflicts: u32) -> impl FnOnce(Arc<SimulatedCloud>) -> CloudClients {
        move |cloud| {
            let mut clients = CloudClients::simulated(cloud.clone());
            clients.cdn = Arc::new(ContendedCdn {
                cloud,
                conflicts: AtomicU32::new(conflicts),
            });
            clients
        }
    }
}

#[async_trait]
impl CdnApi for ContendedCdn {
    async fn create_invalidation(&self, distribution_id: &str, paths: &[String]) -> Result<String, DeployError> {
        self.cloud.create_invalidation(distribution_id, paths).await
    }

    async fn get_distribution_config(&self, distribution_id: &str) -> Result<DistributionConfig, DeployError> {
        self.cloud.get_distribution_config(distribution_id).await
    }

    async fn update_distribution_config(
        &self,
        distribution_id: &str,
        config: &Value,
        if_match: &str,
    ) -> Result<DistributionUpdate, DeployError> {
        let contended = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if contended {
            self.cloud.touch_distribution(distribution_id);
        }
        self.cloud
            .update_distribution_config(distribution_id, config, if_match)
            .await
    }

    async fn distribution_domain(&self, distribution_id: &str) -> Result<String, DeployError> {
        self.cloud.distribution_domain(distribution_id).await
    }
}

#[tokio::test]
async fn test_dns_failure_keeps_certificate() {
    let harness = Harness::new();
    let certificate_arn = harness.cloud.add_certificate("shop.example.com", &[], "ISSUED");
    harness.cloud.fail("upsert_records", "AccessDenied");

    let mut request = harness.fullstack_request("kiosk");
    request.domain_configuration = Some(domain_config("shop.example.com", Some("Z123")));
    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let record = harness.wait_finished("kiosk").await;

    assert_eq!(record.status, DeploymentStatus::Partial);
    // Sub-stages before the DNS change took effect
    assert_eq!(record.outputs["CertificateArn"], certificate_arn);
    assert!(record.outputs.contains_key("FrontendUrl"));
    let distribution_id = &record.outputs["CloudFrontDistributionId"];
    let config = harness.cloud.distribution_config(distribution_id).unwrap();
    assert_eq!(config["ViewerCertificate"]["ACMCertificateArn"], certificate_arn.as_str());

    let entry = record.resource("CustomDomain").unwrap();
    assert_eq!(entry.status, "FAILED");
    assert_eq!(entry.physical_id.as_deref(), Some(certificate_arn.as_str()));
    let error = record.error.as_ref().unwrap();
    assert_eq!(error.failed_steps, vec!["custom_domain".to_string()]);
    assert!(error.details["custom_domain"].contains("AccessDenied"));
    assert!(harness.cloud.dns_records("Z123").is_empty());
}

#[tokio::test]
async fn test_distribution_conflicts_are_retried() {
    let harness = Harness::with_clients(ContendedCdn::clients(2));
    let mut request = harness.fullstack_request("atrium");
    request.domain_configuration = Some(domain_config("atrium.example.com", None));

    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let record = harness.wait_finished("atrium").await;

    assert_eq!(record.status, DeploymentStatus::Completed, "{:?}", record.error);
    let retries: Vec<&str> = record
        .progress_log
        .iter()
        .map(|entry| entry.message.as_str())
        .filter(|message| message.contains("changed concurrently"))
        .collect();
    assert_eq!(retries.len(), 2);
    assert!(retries[1].ends_with("(2/3)"));

    let distribution_id = &record.outputs["CloudFrontDistributionId"];
    let config = harness.cloud.distribution_config(distribution_id).unwrap();
    assert_eq!(config["Aliases"]["Items"][0], "atrium.example.com");
}

#[tokio::test]
async fn test_endless_conflicts_fail_step() {
    let harness = Harness::with_clients(ContendedCdn::clients(u32::MAX));
    let mut request = harness.fullstack_request("bazaar");
    request.domain_configuration = Some(domain_config("bazaar.example.com", None));

    harness.state.orchestrator.orchestrate(request).await.unwrap();
    let record = harness.wait_finished("bazaar").await;

    assert_eq!(record.status, DeploymentStatus::Partial);
    let error = record.error.as_ref().unwrap();
    assert!(error.details["custom_domain"].contains("kept changing"));
    assert!(record.outputs.contains_key("CertificateArn"));
    assert!(!record.outputs.contains_key("CustomDomainUrl"));

    let distribution_id = &record.outputs["CloudFrontDistributionId"];
    let config = harness.cloud.distribution_config(distribution_id).unwrap();
    assert_eq!(config["Aliases"]["Quantity"], 0);
}
