//! Route53 record changes

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::cloud::aws::client::AwsCli;
use crate::cloud::{DnsApi, DnsChange, CLOUDFRONT_HOSTED_ZONE_ID};
use crate::errors::DeployError;

const ROUTE53_REGION: &str = "us-east-1";
const CNAME_TTL: u64 = 300;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeResponse {
    change_info: ChangeInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ChangeInfo {
    id: String,
}

/// Route53 change batch upserting every change
fn change_batch(changes: &[DnsChange]) -> serde_json::Value {
    let changes: Vec<serde_json::Value> = changes
        .iter()
        .map(|change| match change {
            DnsChange::Alias { name, target } => json!({
                "Action": "UPSERT",
                "ResourceRecordSet": {
                    "Name": name,
                    "Type": "A",
                    "AliasTarget": {
                        "HostedZoneId": CLOUDFRONT_HOSTED_ZONE_ID,
                        "DNSName": target,
                        "EvaluateTargetHealth": false
                    }
                }
            }),
            DnsChange::Cname { name, value } => json!({
                "Action": "UPSERT",
                "ResourceRecordSet": {
                    "Name": name,
                    "Type": "CNAME",
                    "TTL": CNAME_TTL,
                    "ResourceRecords": [{ "Value": value }]
                }
            }),
        })
        .collect();
    json!({ "Comment": "launchpad", "Changes": changes })
}

/// Route53 client
pub struct Route53 {
    cli: Arc<AwsCli>,
}

impl Route53 {
    pub fn new(cli: Arc<AwsCli>) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl DnsApi for Route53 {
    async fn upsert_records(&self, hosted_zone_id: &str, changes: &[DnsChange]) -> Result<String, DeployError> {
        let batch = serde_json::to_string(&change_batch(changes))?;
        let response: ChangeResponse = self
            .cli
            .aws_json(
                ROUTE53_REGION,
                &[
                    "route53",
                    "change-resource-record-sets",
                    "--hosted-zone-id",
                    hosted_zone_id,
                    "--change-batch",
                    batch.as_str(),
                ],
            )
            .await?;
        Ok(response.change_info.id)
    }
}
