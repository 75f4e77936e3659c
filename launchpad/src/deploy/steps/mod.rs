//! Optional provisioning steps run after the base stack

pub mod database;
pub mod domain;
pub mod frontend;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use launchpad_models::{DeploymentRequest, StepName, StepResult};

use crate::deploy::progress::ProgressSink;
use crate::storage::settings::WaitSettings;
use crate::utils::CooldownOptions;

pub use database::DatabaseStep;
pub use domain::CustomDomainStep;
pub use frontend::FrontendUploadStep;

/// Output names the base stack may use for each value, in preference order
pub mod outputs {
    pub const API_URL: &[&str] = &["ApiUrl", "ApiEndpoint"];
    pub const BUCKET: &[&str] = &["FrontendBucketName", "BucketName", "WebsiteBucket"];
    pub const DISTRIBUTION_ID: &[&str] = &["CloudFrontDistributionId", "DistributionId"];
    pub const DISTRIBUTION_DOMAIN: &[&str] = &["CloudFrontDomainName", "DistributionDomainName"];
}

/// What a step sees of the attempt
pub struct StepContext<'a> {
    pub project_name: &'a str,
    pub stack_name: &'a str,
    pub region: &'a str,
    /// Outputs known before the step started
    pub outputs: &'a BTreeMap<String, String>,
    pub progress: &'a ProgressSink,
}

impl StepContext<'_> {
    /// First non-empty output among `names`
    pub fn output(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .filter_map(|name| self.outputs.get(*name))
            .map(String::as_str)
            .find(|value| !value.is_empty())
    }
}

/// One optional provisioning step.
///
/// Steps never fail the attempt by themselves: failures are reported in the
/// returned [`StepResult`], together with whatever was provisioned before
/// the failing sub-stage. A step must be safe to run again after a partial
/// success.
#[async_trait]
pub trait ProvisioningStep: Send + Sync {
    fn name(&self) -> StepName;

    /// Whether `request` asks for this step
    fn applies_to(&self, request: &DeploymentRequest) -> bool;

    async fn provision(&self, request: &DeploymentRequest, ctx: &StepContext<'_>) -> StepResult;
}

/// Bounds for wait loops on slow resources
#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub cooldown: CooldownOptions,
    pub certificate_timeout: Duration,
    pub database_timeout: Duration,
}

impl WaitOptions {
    pub fn from_settings(settings: &WaitSettings) -> Self {
        Self {
            cooldown: CooldownOptions {
                base_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(settings.poll_interval_secs.max(1)),
                multiplier: 2.0,
            },
            certificate_timeout: Duration::from_secs(settings.certificate_timeout_secs),
            database_timeout: Duration::from_secs(settings.database_timeout_secs),
        }
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::from_settings(&WaitSettings::default())
    }
}
