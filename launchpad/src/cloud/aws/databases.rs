//! DynamoDB tables and Aurora Serverless clusters

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::cloud::aws::client::{describe, AwsCli};
use crate::cloud::{ClusterDescription, ClusterSpec, CreateOutcome, DatabaseApi, TableDescription, TableSpec};
use crate::errors::DeployError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeTableResponse {
    table: Table,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Table {
    table_name: String,
    table_status: String,
    table_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroupsResponse {
    #[serde(default)]
    security_groups: Vec<SecurityGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SecurityGroup {
    group_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VpcsResponse {
    #[serde(default)]
    vpcs: Vec<Vpc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Vpc {
    cidr_block: String,
}

#[derive(Debug, Deserialize)]
struct ClustersResponse {
    #[serde(rename = "DBClusters", default)]
    clusters: Vec<Cluster>,
}

#[derive(Debug, Deserialize)]
struct Cluster {
    #[serde(rename = "DBClusterIdentifier")]
    cluster_id: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "DBClusterArn")]
    arn: String,
    #[serde(rename = "Endpoint")]
    endpoint: Option<String>,
    #[serde(rename = "Port")]
    port: Option<u16>,
    #[serde(rename = "MasterUserSecret")]
    master_user_secret: Option<MasterUserSecret>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MasterUserSecret {
    secret_arn: String,
}

/// DynamoDB, EC2 and RDS client
pub struct Databases {
    cli: Arc<AwsCli>,
}

impl Databases {
    pub fn new(cli: Arc<AwsCli>) -> Self {
        Self { cli }
    }

    /// Run a create call, treating "already exists" errors as success
    async fn create(&self, region: &str, args: &[&str], exists_codes: &[&str]) -> Result<CreateOutcome, DeployError> {
        let output = self.cli.aws_json_raw(region, args).await?;
        if output.success() {
            return Ok(CreateOutcome::Created);
        }
        if output.mentions(exists_codes) {
            debug!("{} reported an existing resource", describe(args));
            return Ok(CreateOutcome::AlreadyExists);
        }
        Err(output.into_error(&describe(args)))
    }

    async fn find_security_group(&self, group_name: &str, vpc_id: &str, region: &str) -> Result<Option<String>, DeployError> {
        let name_filter = format!("Name=group-name,Values={}", group_name);
        let vpc_filter = format!("Name=vpc-id,Values={}", vpc_id);
        let response: SecurityGroupsResponse = self
            .cli
            .aws_json(
                region,
                &["ec2", "describe-security-groups", "--filters", &name_filter, &vpc_filter],
            )
            .await?;
        Ok(response.security_groups.into_iter().next().map(|g| g.group_id))
    }
}

fn key_args(spec: &TableSpec) -> (Vec<String>, Vec<String>) {
    let mut attributes = vec![format!(
        "AttributeName={},AttributeType={}",
        spec.partition_key.0, spec.partition_key.1
    )];
    let mut schema = vec![format!("AttributeName={},KeyType=HASH", spec.partition_key.0)];
    if let Some((name, attribute_type)) = &spec.sort_key {
        attributes.push(format!("AttributeName={},AttributeType={}", name, attribute_type));
        schema.push(format!("AttributeName={},KeyType=RANGE", name));
    }
    (attributes, schema)
}

#[async_trait]
impl DatabaseApi for Databases {
    async fn create_table(&self, spec: &TableSpec, region: &str) -> Result<CreateOutcome, DeployError> {
        let (attributes, schema) = key_args(spec);
        let mut args = vec!["dynamodb", "create-table", "--table-name", spec.table_name.as_str()];
        args.push("--attribute-definitions");
        args.extend(attributes.iter().map(String::as_str));
        args.push("--key-schema");
        args.extend(schema.iter().map(String::as_str));
        args.extend_from_slice(&["--billing-mode", "PAY_PER_REQUEST"]);
        self.create(region, &args, &["ResourceInUseException"]).await
    }

    async fn describe_table(&self, table_name: &str, region: &str) -> Result<TableDescription, DeployError> {
        let response: DescribeTableResponse = self
            .cli
            .aws_json(region, &["dynamodb", "describe-table", "--table-name", table_name])
            .await?;
        Ok(TableDescription {
            table_name: response.table.table_name,
            status: response.table.table_status,
            arn: response.table.table_arn,
        })
    }

    async fn ensure_security_group(
        &self,
        group_name: &str,
        vpc_id: &str,
        port: u16,
        region: &str,
    ) -> Result<String, DeployError> {
        if let Some(group_id) = self.find_security_group(group_name, vpc_id, region).await? {
            return Ok(group_id);
        }

        let created: SecurityGroup = self
            .cli
            .aws_json(
                region,
                &[
                    "ec2",
                    "create-security-group",
                    "--group-name",
                    group_name,
                    "--description",
                    "Database access from inside the VPC",
                    "--vpc-id",
                    vpc_id,
                ],
            )
            .await?;

        let vpcs: VpcsResponse = self
            .cli
            .aws_json(region, &["ec2", "describe-vpcs", "--vpc-ids", vpc_id])
            .await?;
        let cidr = vpcs
            .vpcs
            .into_iter()
            .next()
            .map(|v| v.cidr_block)
            .ok_or_else(|| DeployError::NotFound(format!("VPC {}", vpc_id)))?;

        let port = port.to_string();
        self.create(
            region,
            &[
                "ec2",
                "authorize-security-group-ingress",
                "--group-id",
                &created.group_id,
                "--protocol",
                "tcp",
                "--port",
                &port,
                "--cidr",
                &cidr,
            ],
            &["InvalidPermission.Duplicate"],
        )
        .await?;
        Ok(created.group_id)
    }

    async fn ensure_subnet_group(&self, group_name: &str, subnet_ids: &[String], region: &str) -> Result<(), DeployError> {
        let mut args = vec![
            "rds",
            "create-db-subnet-group",
            "--db-subnet-group-name",
            group_name,
            "--db-subnet-group-description",
            "Launchpad database subnets",
            "--subnet-ids",
        ];
        args.extend(subnet_ids.iter().map(String::as_str));
        self.create(region, &args, &["DBSubnetGroupAlreadyExists"]).await?;
        Ok(())
    }

    async fn create_cluster(&self, spec: &ClusterSpec, region: &str) -> Result<CreateOutcome, DeployError> {
        let scaling = format!(
            "MinCapacity={},MaxCapacity={}",
            spec.min_capacity, spec.max_capacity
        );
        let outcome = self
            .create(
                region,
                &[
                    "rds",
                    "create-db-cluster",
                    "--db-cluster-identifier",
                    &spec.cluster_id,
                    "--engine",
                    &spec.engine,
                    "--database-name",
                    &spec.database_name,
                    "--master-username",
                    &spec.master_username,
                    "--manage-master-user-password",
                    "--vpc-security-group-ids",
                    &spec.security_group_id,
                    "--db-subnet-group-name",
                    &spec.subnet_group_name,
                    "--serverless-v2-scaling-configuration",
                    &scaling,
                ],
                &["DBClusterAlreadyExistsFault"],
            )
            .await?;

        let instance_id = format!("{}-instance-1", spec.cluster_id);
        self.create(
            region,
            &[
                "rds",
                "create-db-instance",
                "--db-instance-identifier",
                &instance_id,
                "--db-cluster-identifier",
                &spec.cluster_id,
                "--engine",
                &spec.engine,
                "--db-instance-class",
                "db.serverless",
            ],
            &["DBInstanceAlreadyExists"],
        )
        .await?;
        Ok(outcome)
    }

    async fn describe_cluster(&self, cluster_id: &str, region: &str) -> Result<ClusterDescription, DeployError> {
        let response: ClustersResponse = self
            .cli
            .aws_json(
                region,
                &["rds", "describe-db-clusters", "--db-cluster-identifier", cluster_id],
            )
            .await?;
        let cluster = response
            .clusters
            .into_iter()
            .next()
            .ok_or_else(|| DeployError::NotFound(format!("DB cluster {}", cluster_id)))?;
        Ok(ClusterDescription {
            cluster_id: cluster.cluster_id,
            status: cluster.status,
            arn: cluster.arn,
            endpoint: cluster.endpoint,
            port: cluster.port,
            secret_arn: cluster.master_user_secret.map(|s| s.secret_arn),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_args_with_sort_key() {
        let spec = TableSpec {
            table_name: "demo-table".to_string(),
            partition_key: ("pk".to_string(), "S".to_string()),
            sort_key: Some(("sk".to_string(), "N".to_string())),
        };
        let (attributes, schema) = key_args(&spec);
        assert_eq!(attributes, vec!["AttributeName=pk,AttributeType=S", "AttributeName=sk,AttributeType=N"]);
        assert_eq!(schema, vec!["AttributeName=pk,KeyType=HASH", "AttributeName=sk,KeyType=RANGE"]);
    }

    #[test]
    fn test_parse_cluster() {
        let json = r#"{"DBClusters":[{"DBClusterIdentifier":"demo-db","Status":"available",
            "DBClusterArn":"arn:rds","Endpoint":"demo-db.cluster.rds","Port":5432,
            "MasterUserSecret":{"SecretArn":"arn:secret"}}]}"#;
        let response: ClustersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.clusters[0].port, Some(5432));
        assert_eq!(
            response.clusters[0].master_user_secret.as_ref().map(|s| s.secret_arn.as_str()),
            Some("arn:secret")
        );
    }
}
