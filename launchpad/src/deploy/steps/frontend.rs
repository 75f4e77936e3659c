//! Frontend asset upload

use std::sync::Arc;

use async_trait::async_trait;
use launchpad_models::{DeploymentRequest, StepName, StepResult};

use crate::cloud::{CdnApi, ObjectStorage};
use crate::deploy::steps::{outputs, ProvisioningStep, StepContext};

/// Mirrors the built frontend into the site bucket and invalidates the CDN
pub struct FrontendUploadStep {
    storage: Arc<dyn ObjectStorage>,
    cdn: Arc<dyn CdnApi>,
}

impl FrontendUploadStep {
    pub fn new(storage: Arc<dyn ObjectStorage>, cdn: Arc<dyn CdnApi>) -> Self {
        Self { storage, cdn }
    }
}

#[async_trait]
impl ProvisioningStep for FrontendUploadStep {
    fn name(&self) -> StepName {
        StepName::FrontendUpload
    }

    fn applies_to(&self, request: &DeploymentRequest) -> bool {
        request.deployment_type.has_frontend() && request.frontend_configuration.is_some()
    }

    async fn provision(&self, request: &DeploymentRequest, ctx: &StepContext<'_>) -> StepResult {
        let step = self.name();
        let Some(frontend) = &request.frontend_configuration else {
            return StepResult::failed(step, "no frontend configuration");
        };
        let Some(bucket) = ctx.output(outputs::BUCKET) else {
            return StepResult::failed(step, "base stack produced no frontend bucket output");
        };

        let assets = frontend.assets_dir();
        ctx.progress.emit(format!(
            "Uploading {} to bucket {}",
            assets.display(),
            bucket
        ));
        let report = match self.storage.sync(&assets, bucket, ctx.region).await {
            Ok(report) => report,
            Err(e) => return StepResult::failed(step, format!("asset sync failed: {}", e)),
        };
        ctx.progress.emit(format!(
            "Uploaded {} files, deleted {} stale files",
            report.uploaded.len(),
            report.deleted.len()
        ));

        let mut result = StepResult::succeeded(step)
            .with_resource("AWS::S3::Bucket", format!("arn:aws:s3:::{}", bucket));
        if let Some(domain) = ctx.output(outputs::DISTRIBUTION_DOMAIN) {
            result = result.with_info("FrontendUrl", format!("https://{}", domain));
        }

        let Some(distribution_id) = ctx.output(outputs::DISTRIBUTION_ID) else {
            return result;
        };
        if report.is_unchanged() {
            ctx.progress.emit("Assets unchanged, skipping cache invalidation");
            return result;
        }

        match self
            .cdn
            .create_invalidation(distribution_id, &["/*".to_string()])
            .await
        {
            Ok(invalidation_id) => {
                ctx.progress.emit(format!(
                    "Created invalidation {} on distribution {}",
                    invalidation_id, distribution_id
                ));
                result
            }
            Err(e) => StepResult {
                success: false,
                error: Some(format!("cache invalidation failed: {}", e)),
                ..result
            },
        }
    }
}
