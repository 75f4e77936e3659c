//! Stack status lookups

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::cloud::aws::client::{describe, AwsCli};
use crate::cloud::{StackDescription, StackLookup, StackQuery, StackResource};
use crate::errors::DeployError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacksResponse {
    #[serde(default)]
    stacks: Vec<StackSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackSummary {
    stack_id: Option<String>,
    stack_name: String,
    stack_status: String,
    #[serde(default)]
    outputs: Vec<StackOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackOutput {
    output_key: String,
    #[serde(default)]
    output_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStackResourcesResponse {
    #[serde(default)]
    stack_resources: Vec<StackResourceSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackResourceSummary {
    logical_resource_id: String,
    physical_resource_id: Option<String>,
    resource_type: String,
    resource_status: String,
}

/// CloudFormation client
pub struct CloudFormation {
    cli: Arc<AwsCli>,
}

impl CloudFormation {
    pub fn new(cli: Arc<AwsCli>) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl StackQuery for CloudFormation {
    async fn describe_stack(&self, stack_name: &str, region: &str) -> Result<StackLookup, DeployError> {
        let args = ["cloudformation", "describe-stacks", "--stack-name", stack_name];
        let output = self.cli.aws_json_raw(region, &args).await?;
        if !output.success() {
            if output.mentions(&["does not exist"]) {
                return Ok(StackLookup::NotFound);
            }
            return Err(output.into_error(&describe(&args)));
        }

        let response: DescribeStacksResponse = serde_json::from_str(&output.stdout)?;
        let Some(stack) = response.stacks.into_iter().next() else {
            return Ok(StackLookup::NotFound);
        };

        let resources: DescribeStackResourcesResponse = self
            .cli
            .aws_json(
                region,
                &["cloudformation", "describe-stack-resources", "--stack-name", stack_name],
            )
            .await?;

        Ok(StackLookup::Found(StackDescription {
            stack_name: stack.stack_name,
            stack_id: stack.stack_id,
            native_status: stack.stack_status,
            outputs: stack
                .outputs
                .into_iter()
                .map(|o| (o.output_key, o.output_value))
                .collect::<BTreeMap<_, _>>(),
            resources: resources
                .stack_resources
                .into_iter()
                .map(|r| StackResource {
                    logical_id: r.logical_resource_id,
                    resource_type: r.resource_type,
                    status: r.resource_status,
                    physical_id: r.physical_resource_id,
                })
                .collect(),
        }))
    }
}
