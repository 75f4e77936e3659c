//! Base stack apply

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use launchpad_models::DeploymentRequest;
use tracing::debug;

use crate::cloud::aws::AwsCli;
use crate::cloud::{StackLookup, StackQuery, StackResource};
use crate::deploy::progress::ProgressSink;
use crate::deploy::template::ResolvedTemplate;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;

/// Where and how to apply a template
#[derive(Debug, Clone)]
pub struct StackConfig {
    pub project_name: String,
    pub stack_name: String,
    pub region: String,
    /// Template parameter overrides
    pub parameters: BTreeMap<String, String>,
}

impl StackConfig {
    /// Stack config for `request`, with parameters derived from its configuration blocks
    pub fn from_request(request: &DeploymentRequest, region: &str) -> Self {
        let mut parameters = BTreeMap::new();
        parameters.insert("ProjectName".to_string(), request.project_name.clone());

        if let Some(backend) = &request.backend_configuration {
            if let Some(runtime) = &backend.runtime {
                parameters.insert("Runtime".to_string(), runtime.clone());
            }
            if let Some(memory) = backend.memory_size {
                parameters.insert("MemorySize".to_string(), memory.to_string());
            }
            if let Some(timeout) = backend.timeout {
                parameters.insert("Timeout".to_string(), timeout.to_string());
            }
            if !backend.environment.is_empty() {
                let pairs: Vec<String> = backend
                    .environment
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                parameters.insert("Environment".to_string(), pairs.join(","));
            }
        }
        if let Some(frontend) = &request.frontend_configuration {
            parameters.insert("IndexDocument".to_string(), frontend.index_document.clone());
        }

        Self {
            project_name: request.project_name.clone(),
            stack_name: request.stack_name(),
            region: region.to_string(),
            parameters,
        }
    }
}

/// What a successful apply produced
#[derive(Debug, Clone, Default)]
pub struct StackOutcome {
    pub stack_name: String,
    pub stack_id: Option<String>,
    pub outputs: BTreeMap<String, String>,
    pub resources: Vec<StackResource>,
}

/// Applies the base infrastructure template
#[async_trait]
pub trait StackDeployer: Send + Sync {
    /// Apply `template`. Any failure is fatal for the attempt; tool failures
    /// come back as [`DeployError::StackApplyError`].
    async fn apply(
        &self,
        template: &ResolvedTemplate,
        config: &StackConfig,
        progress: &ProgressSink,
    ) -> Result<StackOutcome, DeployError>;
}

/// Stack deployer running `sam build` and `sam deploy`
pub struct SamStackDeployer {
    cli: Arc<AwsCli>,
    query: Arc<dyn StackQuery>,
    build_dir: Dir,
}

impl SamStackDeployer {
    pub fn new(cli: Arc<AwsCli>, query: Arc<dyn StackQuery>, build_dir: Dir) -> Self {
        Self {
            cli,
            query,
            build_dir,
        }
    }

    async fn sam_checked(&self, args: Vec<String>) -> Result<(), DeployError> {
        let output = self.cli.sam(&args, None).await?;
        debug!("sam {} exited with {}", args[0], output.exit_code);
        if !output.success() {
            return Err(DeployError::StackApplyError {
                stdout: output.stdout,
                stderr: output.stderr,
                exit_code: output.exit_code,
            });
        }
        Ok(())
    }
}

fn parameter_overrides(parameters: &BTreeMap<String, String>) -> Vec<String> {
    parameters
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect()
}

#[async_trait]
impl StackDeployer for SamStackDeployer {
    async fn apply(
        &self,
        template: &ResolvedTemplate,
        config: &StackConfig,
        progress: &ProgressSink,
    ) -> Result<StackOutcome, DeployError> {
        let build_dir = self.build_dir.subdir(&config.project_name).subdir("build");
        build_dir.create().await?;
        let template_path = template.template_path.to_string_lossy().into_owned();
        let build_path = build_dir.path().to_string_lossy().into_owned();

        progress.emit(format!("Building {}", template.template_path.display()));
        self.sam_checked(vec![
            "build".to_string(),
            "--template-file".to_string(),
            template_path,
            "--build-dir".to_string(),
            build_path.clone(),
        ])
        .await?;

        progress.emit(format!(
            "Deploying stack {} to {}",
            config.stack_name, config.region
        ));
        let mut args = vec![
            "deploy".to_string(),
            "--template-file".to_string(),
            build_dir.file("template.yaml").path().to_string_lossy().into_owned(),
            "--stack-name".to_string(),
            config.stack_name.clone(),
            "--region".to_string(),
            config.region.clone(),
            "--capabilities".to_string(),
            "CAPABILITY_IAM".to_string(),
            "CAPABILITY_NAMED_IAM".to_string(),
            "CAPABILITY_AUTO_EXPAND".to_string(),
            "--resolve-s3".to_string(),
            "--no-confirm-changeset".to_string(),
            "--no-fail-on-empty-changeset".to_string(),
        ];
        if !config.parameters.is_empty() {
            args.push("--parameter-overrides".to_string());
            args.extend(parameter_overrides(&config.parameters));
        }
        self.sam_checked(args).await?;

        match self.query.describe_stack(&config.stack_name, &config.region).await? {
            StackLookup::Found(description) => {
                progress.emit(format!(
                    "Stack {} is {}",
                    description.stack_name, description.native_status
                ));
                Ok(StackOutcome {
                    stack_name: description.stack_name,
                    stack_id: description.stack_id,
                    outputs: description.outputs,
                    resources: description.resources,
                })
            }
            StackLookup::NotFound => Err(DeployError::NotFound(format!(
                "stack {} after deploy",
                config.stack_name
            ))),
        }
    }
}
