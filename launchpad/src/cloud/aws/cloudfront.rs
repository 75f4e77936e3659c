//! CloudFront distribution updates and invalidations

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::cloud::aws::client::{describe, AwsCli};
use crate::cloud::{CdnApi, DistributionConfig, DistributionUpdate};
use crate::errors::DeployError;

// CloudFront is a global service addressed through us-east-1
const CLOUDFRONT_REGION: &str = "us-east-1";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InvalidationResponse {
    invalidation: Invalidation,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Invalidation {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DistributionConfigResponse {
    #[serde(rename = "ETag")]
    etag: String,
    #[serde(rename = "DistributionConfig")]
    distribution_config: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    #[serde(rename = "ETag")]
    etag: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DistributionResponse {
    distribution: Distribution,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Distribution {
    domain_name: String,
}

/// CloudFront client
pub struct CloudFront {
    cli: Arc<AwsCli>,
}

impl CloudFront {
    pub fn new(cli: Arc<AwsCli>) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl CdnApi for CloudFront {
    async fn create_invalidation(&self, distribution_id: &str, paths: &[String]) -> Result<String, DeployError> {
        let mut args = vec!["cloudfront", "create-invalidation", "--distribution-id", distribution_id, "--paths"];
        args.extend(paths.iter().map(String::as_str));
        let response: InvalidationResponse = self.cli.aws_json(CLOUDFRONT_REGION, &args).await?;
        Ok(response.invalidation.id)
    }

    async fn get_distribution_config(&self, distribution_id: &str) -> Result<DistributionConfig, DeployError> {
        let response: DistributionConfigResponse = self
            .cli
            .aws_json(
                CLOUDFRONT_REGION,
                &["cloudfront", "get-distribution-config", "--id", distribution_id],
            )
            .await?;
        Ok(DistributionConfig {
            config: response.distribution_config,
            etag: response.etag,
        })
    }

    async fn update_distribution_config(
        &self,
        distribution_id: &str,
        config: &serde_json::Value,
        if_match: &str,
    ) -> Result<DistributionUpdate, DeployError> {
        let document = serde_json::to_string(config)?;
        let args = [
            "cloudfront",
            "update-distribution",
            "--id",
            distribution_id,
            "--if-match",
            if_match,
            "--distribution-config",
            document.as_str(),
        ];
        let output = self.cli.aws_json_raw(CLOUDFRONT_REGION, &args).await?;
        if !output.success() {
            if output.mentions(&["PreconditionFailed", "InvalidIfMatchVersion"]) {
                return Ok(DistributionUpdate::PreconditionFailed);
            }
            return Err(output.into_error(&describe(&args)));
        }
        let response: UpdateResponse = serde_json::from_str(&output.stdout)?;
        Ok(DistributionUpdate::Updated { etag: response.etag })
    }

    async fn distribution_domain(&self, distribution_id: &str) -> Result<String, DeployError> {
        let response: DistributionResponse = self
            .cli
            .aws_json(CLOUDFRONT_REGION, &["cloudfront", "get-distribution", "--id", distribution_id])
            .await?;
        Ok(response.distribution.domain_name)
    }
}
