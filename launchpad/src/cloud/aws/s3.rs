//! Bucket mirroring through `aws s3 sync`

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cloud::aws::client::AwsCli;
use crate::cloud::{ObjectStorage, SyncReport};
use crate::errors::DeployError;

/// S3 client
pub struct S3 {
    cli: Arc<AwsCli>,
}

impl S3 {
    pub fn new(cli: Arc<AwsCli>) -> Self {
        Self { cli }
    }
}

/// Collect object keys from `aws s3 sync` output lines
fn parse_sync_output(stdout: &str, bucket: &str) -> SyncReport {
    let prefix = format!("s3://{}/", bucket);
    let mut report = SyncReport::default();
    for line in stdout.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("upload: ") {
            if let Some((_, target)) = rest.rsplit_once(" to ") {
                let key = target.strip_prefix(&prefix).unwrap_or(target);
                report.uploaded.push(key.to_string());
            }
        } else if let Some(target) = line.strip_prefix("delete: ") {
            let key = target.strip_prefix(&prefix).unwrap_or(target);
            report.deleted.push(key.to_string());
        }
    }
    report
}

#[async_trait]
impl ObjectStorage for S3 {
    async fn sync(&self, local_dir: &Path, bucket: &str, region: &str) -> Result<SyncReport, DeployError> {
        let source = local_dir.to_string_lossy();
        let target = format!("s3://{}", bucket);
        let output = self
            .cli
            .aws(
                region,
                &["s3", "sync", source.as_ref(), &target, "--delete", "--no-progress"],
            )
            .await?;
        if !output.success() {
            return Err(output.into_error("aws s3 sync"));
        }
        Ok(parse_sync_output(&output.stdout, bucket))
    }
}
