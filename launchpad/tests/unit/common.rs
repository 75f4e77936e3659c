//! Shared fixtures: a launchpad wired to the simulated cloud in a temp dir

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use launchpad::app::options::AppOptions;
use launchpad::app::state::AppState;
use launchpad::cloud::simulated::SimulatedCloud;
use launchpad::cloud::CloudClients;
use launchpad::deploy::steps::WaitOptions;
use launchpad::query::DeploymentLookup;
use launchpad::storage::layout::StorageLayout;
use launchpad::store::MemoryRecordStore;
use launchpad::utils::CooldownOptions;
use launchpad_models::{
    BackendConfig, DatabaseConfig, DeploymentRecord, DeploymentRequest, DeploymentType,
    DomainConfig, DynamoDbConfig, FrontendConfig, KeyAttribute, RelationalConfig,
    RelationalDialect,
};
use tempfile::TempDir;

const BACKEND_TEMPLATE: &str = r#"
AWSTemplateFormatVersion: '2010-09-09'
Transform: AWS::Serverless-2016-10-31
Description: {{stackName}}
Resources:
  ApiFunction:
    Type: AWS::Serverless::Function
    Properties:
      CodeUri: {{backendSourcePath}}
      Handler: index.handler
"#;

const BACKEND_DEFAULT_TEMPLATE: &str = r#"
Resources:
  ApiFunction:
    Type: AWS::Serverless::Function
"#;

const FRONTEND_TEMPLATE: &str = r#"
Resources:
  SiteBucket:
    Type: AWS::S3::Bucket
  SiteDistribution:
    Type: AWS::CloudFront::Distribution
"#;

const FULLSTACK_TEMPLATE: &str = r#"
Resources:
  ApiFunction:
    Type: AWS::Serverless::Function
  SiteBucket:
    Type: AWS::S3::Bucket
  SiteDistribution:
    Type: AWS::CloudFront::Distribution
"#;

pub struct Harness {
    pub dir: TempDir,
    pub cloud: Arc<SimulatedCloud>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_stale_after(None)
    }

    pub fn with_stale_after(stale_after: Option<Duration>) -> Self {
        Self::build(stale_after, CloudClients::simulated)
    }

    /// Harness whose collaborators come from `clients`, e.g. to wrap one of them
    pub fn with_clients(clients: impl FnOnce(Arc<SimulatedCloud>) -> CloudClients) -> Self {
        Self::build(None, clients)
    }

    fn build(
        stale_after: Option<Duration>,
        clients: impl FnOnce(Arc<SimulatedCloud>) -> CloudClients,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        write_templates(&dir.path().join("templates"));

        let options = AppOptions {
            layout: StorageLayout::new(dir.path()),
            stale_after,
            waits: WaitOptions {
                cooldown: CooldownOptions {
                    base_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(5),
                    multiplier: 2.0,
                },
                certificate_timeout: Duration::from_secs(5),
                database_timeout: Duration::from_secs(5),
            },
            ..Default::default()
        };

        let cloud = Arc::new(SimulatedCloud::new());
        let state = AppState::assemble(
            &options,
            Arc::new(MemoryRecordStore::new()),
            clients(cloud.clone()),
        );
        Self { dir, cloud, state }
    }

    /// A directory under the harness root holding `files`
    pub fn source_dir(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = self.dir.path().join("sources").join(name);
        std::fs::create_dir_all(&path).unwrap();
        for (file, contents) in files {
            let target = path.join(file);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(target, contents).unwrap();
        }
        path
    }

    pub fn backend_request(&self, project: &str) -> DeploymentRequest {
        let source = self.source_dir(&format!("{}-api", project), &[("index.js", "exports.handler = 1;")]);
        DeploymentRequest {
            project_name: project.to_string(),
            deployment_type: DeploymentType::Backend,
            framework: "express".to_string(),
            region: None,
            stack_name: None,
            backend_configuration: Some(BackendConfig {
                source_path: source,
                runtime: None,
                memory_size: None,
                timeout: None,
                environment: Default::default(),
            }),
            frontend_configuration: None,
            database_configuration: None,
            domain_configuration: None,
        }
    }

    pub fn frontend_request(&self, project: &str) -> DeploymentRequest {
        let source = self.source_dir(
            &format!("{}-site", project),
            &[("index.html", "<h1>hi</h1>"), ("assets/app.js", "console.log(1)")],
        );
        DeploymentRequest {
            project_name: project.to_string(),
            deployment_type: DeploymentType::Frontend,
            framework: "react".to_string(),
            region: None,
            stack_name: None,
            backend_configuration: None,
            frontend_configuration: Some(FrontendConfig {
                source_path: source,
                build_output: None,
                index_document: "index.html".to_string(),
                error_document: None,
            }),
            database_configuration: None,
            domain_configuration: None,
        }
    }

    pub fn fullstack_request(&self, project: &str) -> DeploymentRequest {
        let backend = self.backend_request(project);
        let frontend = self.frontend_request(project);
        DeploymentRequest {
            deployment_type: DeploymentType::Fullstack,
            framework: "react-express".to_string(),
            backend_configuration: backend.backend_configuration,
            frontend_configuration: frontend.frontend_configuration,
            ..backend
        }
    }

    /// Wait until `project`'s attempt has stopped running
    pub async fn wait_finished(&self, project: &str) -> DeploymentRecord {
        for _ in 0..500 {
            if !self.state.active.contains(project) {
                if let DeploymentLookup::Found(record) =
                    self.state.orchestrator.current_status(project).await.unwrap()
                {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("deployment of {} did not finish", project);
    }
}

pub fn dynamodb_config() -> DatabaseConfig {
    DatabaseConfig::Dynamodb(DynamoDbConfig {
        table_name: None,
        partition_key: KeyAttribute {
            name: "id".to_string(),
            attribute_type: "S".to_string(),
        },
        sort_key: None,
    })
}

pub fn domain_config(domain: &str, hosted_zone_id: Option<&str>) -> DomainConfig {
    DomainConfig {
        domain_name: domain.to_string(),
        hosted_zone_id: hosted_zone_id.map(str::to_string),
        certificate_arn: None,
        include_www: false,
    }
}

fn write_templates(root: &Path) {
    let files = [
        ("backend/express.yaml.hbs", BACKEND_TEMPLATE),
        ("backend/default.yaml", BACKEND_DEFAULT_TEMPLATE),
        ("frontend/default.yaml", FRONTEND_TEMPLATE),
        ("fullstack/default.yaml", FULLSTACK_TEMPLATE),
    ];
    for (name, contents) in files {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

pub fn aurora_config() -> DatabaseConfig {
    DatabaseConfig::AuroraServerless(RelationalConfig {
        dialect: RelationalDialect::Postgres,
        database_name: "app".to_string(),
        master_username: "dbadmin".to_string(),
        min_capacity: 0.5,
        max_capacity: 2.0,
        vpc_id: "vpc-0abc".to_string(),
        subnet_ids: vec!["subnet-a".to_string(), "subnet-b".to_string()],
    })
}
