//! Database provisioning

use std::sync::Arc;

use async_trait::async_trait;
use launchpad_models::{
    DatabaseConfig, DeploymentRequest, DynamoDbConfig, RelationalConfig, StepName, StepResult,
};

use crate::cloud::{ClusterSpec, CreateOutcome, DatabaseApi, TableSpec};
use crate::deploy::steps::{ProvisioningStep, StepContext, WaitOptions};
use crate::errors::DeployError;
use crate::utils::{wait_until, WaitState};

/// Creates the project's database and waits until it is usable
pub struct DatabaseStep {
    api: Arc<dyn DatabaseApi>,
    waits: WaitOptions,
}

impl DatabaseStep {
    pub fn new(api: Arc<dyn DatabaseApi>, waits: WaitOptions) -> Self {
        Self { api, waits }
    }

    async fn dynamodb(&self, config: &DynamoDbConfig, ctx: &StepContext<'_>) -> Result<StepResult, DeployError> {
        let table_name = config
            .table_name
            .clone()
            .unwrap_or_else(|| format!("{}-table", ctx.project_name));
        let spec = TableSpec {
            table_name: table_name.clone(),
            partition_key: (
                config.partition_key.name.clone(),
                config.partition_key.attribute_type.clone(),
            ),
            sort_key: config
                .sort_key
                .as_ref()
                .map(|k| (k.name.clone(), k.attribute_type.clone())),
        };

        ctx.progress.emit(format!("Creating DynamoDB table {}", table_name));
        if self.api.create_table(&spec, ctx.region).await? == CreateOutcome::AlreadyExists {
            ctx.progress.emit(format!("Table {} already exists", table_name));
        }

        let (api, name, region) = (&self.api, table_name.as_str(), ctx.region);
        let table = wait_until(
            &format!("table {}", table_name),
            self.waits.database_timeout,
            &self.waits.cooldown,
            move || async move {
                let table = api.describe_table(name, region).await?;
                if table.status.eq_ignore_ascii_case("ACTIVE") {
                    Ok(WaitState::Ready(table))
                } else {
                    Ok(WaitState::Pending(table.status))
                }
            },
        )
        .await?;
        ctx.progress.emit(format!("Table {} is active", table.table_name));

        Ok(StepResult::succeeded(StepName::Database)
            .with_resource("AWS::DynamoDB::Table", table.arn.clone())
            .with_info("DatabaseEngine", "dynamodb")
            .with_info("DatabaseTableName", table.table_name)
            .with_info("DatabaseArn", table.arn))
    }

    async fn aurora(&self, config: &RelationalConfig, ctx: &StepContext<'_>) -> Result<StepResult, DeployError> {
        let project = ctx.project_name.to_lowercase();
        let port = config.dialect.port();

        ctx.progress.emit(format!("Preparing network access in {}", config.vpc_id));
        let security_group_id = self
            .api
            .ensure_security_group(&format!("{}-db-sg", project), &config.vpc_id, port, ctx.region)
            .await?;
        let subnet_group_name = format!("{}-db-subnets", project);
        self.api
            .ensure_subnet_group(&subnet_group_name, &config.subnet_ids, ctx.region)
            .await?;

        let spec = ClusterSpec {
            cluster_id: format!("{}-db", project),
            engine: config.dialect.rds_engine().to_string(),
            database_name: config.database_name.clone(),
            master_username: config.master_username.clone(),
            security_group_id,
            subnet_group_name,
            min_capacity: config.min_capacity,
            max_capacity: config.max_capacity,
        };
        ctx.progress.emit(format!("Creating Aurora Serverless cluster {}", spec.cluster_id));
        if self.api.create_cluster(&spec, ctx.region).await? == CreateOutcome::AlreadyExists {
            ctx.progress.emit(format!("Cluster {} already exists", spec.cluster_id));
        }

        let (api, cluster_id, region) = (&self.api, spec.cluster_id.as_str(), ctx.region);
        let cluster = wait_until(
            &format!("cluster {}", spec.cluster_id),
            self.waits.database_timeout,
            &self.waits.cooldown,
            move || async move {
                let cluster = api.describe_cluster(cluster_id, region).await?;
                if cluster.status.eq_ignore_ascii_case("available") {
                    Ok(WaitState::Ready(cluster))
                } else {
                    Ok(WaitState::Pending(cluster.status))
                }
            },
        )
        .await?;
        ctx.progress.emit(format!("Cluster {} is available", cluster.cluster_id));

        let mut result = StepResult::succeeded(StepName::Database)
            .with_resource("AWS::RDS::DBCluster", cluster.arn.clone())
            .with_info("DatabaseEngine", spec.engine)
            .with_info("DatabaseName", config.database_name.clone())
            .with_info("DatabaseArn", cluster.arn)
            .with_info("DatabasePort", cluster.port.unwrap_or(port).to_string());
        if let Some(endpoint) = cluster.endpoint {
            result = result.with_info("DatabaseEndpoint", endpoint);
        }
        if let Some(secret_arn) = cluster.secret_arn {
            result = result.with_info("DatabaseSecretArn", secret_arn);
        }
        Ok(result)
    }
}

#[async_trait]
impl ProvisioningStep for DatabaseStep {
    fn name(&self) -> StepName {
        StepName::Database
    }

    fn applies_to(&self, request: &DeploymentRequest) -> bool {
        request.database_configuration.is_some()
    }

    async fn provision(&self, request: &DeploymentRequest, ctx: &StepContext<'_>) -> StepResult {
        let outcome = match &request.database_configuration {
            Some(DatabaseConfig::Dynamodb(config)) => self.dynamodb(config, ctx).await,
            Some(DatabaseConfig::AuroraServerless(config)) => self.aurora(config, ctx).await,
            None => return StepResult::failed(self.name(), "no database configuration"),
        };
        outcome.unwrap_or_else(|e| StepResult::failed(self.name(), e.to_string()))
    }
}
