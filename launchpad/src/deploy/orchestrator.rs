//! Deployment orchestration
//!
//! `orchestrate` validates the request, resolves its template, writes an
//! `in_progress` record and returns. The attempt then runs in the background:
//! base stack first, then the optional steps in stages. Steps sharing a stage
//! run concurrently. The final status is written after the last progress
//! entry has been appended.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use launchpad_models::{
    DeploymentRecord, DeploymentRequest, DeploymentStatus, ProgressEntry, RecordError,
    ResourceEntry, StepName, StepResult,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::deploy::active::ActiveDeployments;
use crate::deploy::fsm::{AttemptEvent, DeploymentFsm};
use crate::deploy::progress::{spawn_forwarder, ProgressSink};
use crate::deploy::stack::{StackConfig, StackDeployer, StackOutcome};
use crate::deploy::steps::{ProvisioningStep, StepContext};
use crate::deploy::template::{ResolvedTemplate, TemplateResolver};
use crate::deploy::validate::validate_request;
use crate::errors::DeployError;
use crate::query::DeploymentLookup;
use crate::store::Records;
use crate::utils::new_attempt_id;

/// Resource status of a declared resource before the stack reports it
pub const PENDING_RESOURCE_STATUS: &str = "PENDING";

/// Steps sharing a stage run concurrently; stages run in order
const STAGES: &[&[StepName]] = &[
    &[StepName::FrontendUpload],
    &[StepName::Database, StepName::CustomDomain],
];

/// Orchestrator options
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Region for requests that do not name one
    pub default_region: String,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            default_region: "us-east-1".to_string(),
        }
    }
}

/// Runs deployment attempts, at most one per project at a time
pub struct Orchestrator {
    records: Arc<Records>,
    templates: Arc<dyn TemplateResolver>,
    stack_deployer: Arc<dyn StackDeployer>,
    steps: Vec<Arc<dyn ProvisioningStep>>,
    active: Arc<ActiveDeployments>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        records: Arc<Records>,
        templates: Arc<dyn TemplateResolver>,
        stack_deployer: Arc<dyn StackDeployer>,
        steps: Vec<Arc<dyn ProvisioningStep>>,
        active: Arc<ActiveDeployments>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            records,
            templates,
            stack_deployer,
            steps,
            active,
            options,
        }
    }

    pub fn records(&self) -> &Arc<Records> {
        &self.records
    }

    pub fn active(&self) -> &Arc<ActiveDeployments> {
        &self.active
    }

    /// Steps `request` asks for, grouped by stage
    pub fn plan(&self, request: &DeploymentRequest) -> Vec<Vec<Arc<dyn ProvisioningStep>>> {
        STAGES
            .iter()
            .map(|stage| {
                stage
                    .iter()
                    .filter_map(|name| self.steps.iter().find(|s| s.name() == *name))
                    .filter(|step| step.applies_to(request))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|stage| !stage.is_empty())
            .collect()
    }

    /// Step names of [`Orchestrator::plan`]
    pub fn plan_names(&self, request: &DeploymentRequest) -> Vec<Vec<StepName>> {
        self.plan(request)
            .iter()
            .map(|stage| stage.iter().map(|s| s.name()).collect())
            .collect()
    }

    /// Start a deployment attempt.
    ///
    /// Returns the `in_progress` record once it is stored; the attempt keeps
    /// running in the background. Nothing is written when validation or
    /// template resolution fails.
    pub async fn orchestrate(self: &Arc<Self>, request: DeploymentRequest) -> Result<DeploymentRecord, DeployError> {
        validate_request(&request)?;

        let project_name = request.project_name.clone();
        if !self.active.try_register(&project_name) {
            return Err(DeployError::AlreadyInProgress(project_name));
        }

        match self.start(request).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.active.finish(&project_name);
                Err(e)
            }
        }
    }

    /// Latest stored record, without refreshing it
    pub async fn current_status(&self, project_name: &str) -> Result<DeploymentLookup, DeployError> {
        Ok(match self.records.get(project_name).await? {
            Some(record) => DeploymentLookup::Found(record),
            None => DeploymentLookup::NotFound(project_name.to_string()),
        })
    }

    async fn start(self: &Arc<Self>, request: DeploymentRequest) -> Result<DeploymentRecord, DeployError> {
        let template = self.templates.resolve(&request).await?;

        let project_name = request.project_name.clone();
        let region = request.region_or(&self.options.default_region);
        let stack_name = request.stack_name();
        let attempt_id = new_attempt_id();

        let record = self
            .records
            .upsert(
                &project_name,
                || DeploymentRecord::new(&project_name, &stack_name, &region),
                |record| {
                    record.status = DeploymentStatus::InProgress;
                    record.attempt_id = Some(attempt_id.clone());
                    record.deployment_type = Some(request.deployment_type);
                    record.region = region.clone();
                    record.stack_name = stack_name.clone();
                    record.error = None;
                    for declared in &template.declared_resources {
                        if record.resource(&declared.logical_id).is_none() {
                            record.upsert_resource(ResourceEntry {
                                logical_id: declared.logical_id.clone(),
                                resource_type: declared.resource_type.clone(),
                                status: PENDING_RESOURCE_STATUS.to_string(),
                                physical_id: None,
                                last_updated: Utc::now(),
                            });
                        }
                    }
                },
            )
            .await?;
        self.records
            .append_progress(
                &project_name,
                &ProgressEntry::now(format!(
                    "Deployment {} accepted: {} {} in {}",
                    attempt_id, request.deployment_type, request.framework, region
                )),
            )
            .await?;
        info!(
            "Started deployment {} for {} ({})",
            attempt_id, project_name, request.deployment_type
        );

        let (sink, rx) = ProgressSink::channel(&project_name);
        let forwarder = spawn_forwarder(self.records.clone(), project_name.clone(), rx);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.run(&request, &template, &region, sink, forwarder).await;
            this.active.finish(&request.project_name);
        });
        self.active.attach(&project_name, handle.abort_handle());

        Ok(record)
    }

    async fn run(
        &self,
        request: &DeploymentRequest,
        template: &ResolvedTemplate,
        region: &str,
        sink: ProgressSink,
        forwarder: JoinHandle<()>,
    ) {
        let project_name = request.project_name.as_str();
        let config = StackConfig::from_request(request, region);
        let mut fsm = DeploymentFsm::new();
        let mut record_error: Option<RecordError> = None;

        advance(&mut fsm, AttemptEvent::ApplyStack);
        sink.emit(format!("Applying stack {} in {}", config.stack_name, region));
        match self.stack_deployer.apply(template, &config, &sink).await {
            Err(e) => {
                sink.emit(format!("Stack {} failed: {}", config.stack_name, e));
                advance(&mut fsm, AttemptEvent::StackFailed(e.to_string()));
                record_error = Some(error_record(&e));
            }
            Ok(outcome) => {
                sink.emit(format!("Stack {} applied", outcome.stack_name));
                advance(&mut fsm, AttemptEvent::StackApplied);

                let outputs = self.record_stack(project_name, &outcome).await;
                let failed = self.run_steps(request, &config, outputs, &sink).await;
                let failed_names: Vec<String> =
                    failed.iter().map(|r| r.step_name.to_string()).collect();
                advance(&mut fsm, AttemptEvent::StepsFinished(failed_names.clone()));

                if !failed.is_empty() {
                    let mut error = RecordError::new(
                        "step",
                        fsm.error().unwrap_or("Optional steps failed").to_string(),
                    );
                    error.failed_steps = failed_names;
                    for result in &failed {
                        error.details.insert(
                            result.step_name.to_string(),
                            result.error.clone().unwrap_or_default(),
                        );
                    }
                    record_error = Some(error);
                }
            }
        }

        let status = fsm.status();
        sink.emit(format!("Deployment finished: {}", status));
        sink.close();
        drop(sink);
        if let Err(e) = forwarder.await {
            warn!("Progress forwarder for {} ended abnormally: {}", project_name, e);
        }

        let result = self
            .records
            .update(project_name, |record| {
                record.status = status;
                record.error = record_error;
            })
            .await;
        match result {
            Ok(_) => info!("Deployment of {} finished: {}", project_name, status),
            Err(e) => error!("Failed to store final status of {}: {}", project_name, e),
        }
    }

    /// Fold the stack outcome into the record, returning the outputs steps will see
    async fn record_stack(&self, project_name: &str, outcome: &StackOutcome) -> BTreeMap<String, String> {
        let result = self
            .records
            .update(project_name, |record| {
                if outcome.stack_id.is_some() {
                    record.stack_id = outcome.stack_id.clone();
                }
                record.merge_outputs(outcome.outputs.clone());
                let now = Utc::now();
                for resource in &outcome.resources {
                    record.upsert_resource(ResourceEntry {
                        logical_id: resource.logical_id.clone(),
                        resource_type: resource.resource_type.clone(),
                        status: resource.status.clone(),
                        physical_id: resource.physical_id.clone(),
                        last_updated: now,
                    });
                }
            })
            .await;

        match result {
            Ok(record) => record.outputs,
            Err(e) => {
                error!("Failed to store stack outcome of {}: {}", project_name, e);
                outcome.outputs.clone()
            }
        }
    }

    /// Run the planned steps, returning the failed results
    async fn run_steps(
        &self,
        request: &DeploymentRequest,
        config: &StackConfig,
        mut outputs: BTreeMap<String, String>,
        sink: &ProgressSink,
    ) -> Vec<StepResult> {
        let mut failed = Vec::new();
        for stage in self.plan(request) {
            let snapshot = outputs.clone();
            let ctx = StepContext {
                project_name: &request.project_name,
                stack_name: &config.stack_name,
                region: &config.region,
                outputs: &snapshot,
                progress: sink,
            };
            let results = join_all(
                stage
                    .iter()
                    .map(|step| self.run_step(step.as_ref(), request, &ctx)),
            )
            .await;

            for result in results {
                outputs.extend(result.connection_info.clone());
                if !result.success {
                    failed.push(result);
                }
            }
        }
        failed
    }

    async fn run_step(
        &self,
        step: &dyn ProvisioningStep,
        request: &DeploymentRequest,
        ctx: &StepContext<'_>,
    ) -> StepResult {
        let name = step.name();
        ctx.progress.emit(format!("Starting step {}", name));
        let result = step.provision(request, ctx).await;
        match &result.error {
            None if result.success => ctx.progress.emit(format!("Step {} succeeded", name)),
            error => ctx.progress.emit(format!(
                "Step {} failed: {}",
                name,
                error.as_deref().unwrap_or("unknown error")
            )),
        }

        if let Err(e) = self
            .records
            .update(ctx.project_name, |record| fold_step_result(record, &result))
            .await
        {
            error!("Failed to store result of step {} for {}: {}", name, ctx.project_name, e);
        }
        result
    }
}

fn advance(fsm: &mut DeploymentFsm, event: AttemptEvent) {
    if let Err(e) = fsm.process(event) {
        warn!("{}", e);
    }
}

/// Record error for a failed attempt, keeping tool output for stack failures
fn error_record(err: &DeployError) -> RecordError {
    let mut record = RecordError::new(err.kind(), err.to_string());
    if let DeployError::StackApplyError {
        stdout,
        stderr,
        exit_code,
    } = err
    {
        record.details.insert("stdout".to_string(), stdout.clone());
        record.details.insert("stderr".to_string(), stderr.clone());
        record.details.insert("exitCode".to_string(), exit_code.to_string());
    }
    record
}

/// Merge a step's connection info and resource into the record
fn fold_step_result(record: &mut DeploymentRecord, result: &StepResult) {
    record.merge_outputs(result.connection_info.clone());

    let status = if result.success { "PROVISIONED" } else { "FAILED" };
    if result.resource_id.is_some() || !result.success {
        let resource_type = result
            .resource_type
            .clone()
            .unwrap_or_else(|| format!("Launchpad::Step::{}", result.step_name.logical_id()));
        record.upsert_resource(ResourceEntry {
            logical_id: result.step_name.logical_id().to_string(),
            resource_type,
            status: status.to_string(),
            physical_id: result.resource_id.clone(),
            last_updated: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_error_keeps_tool_output() {
        let err = DeployError::StackApplyError {
            stdout: "out".to_string(),
            stderr: "Error: bad template".to_string(),
            exit_code: 1,
        };
        let record = error_record(&err);
        assert_eq!(record.kind, "stack_apply");
        assert_eq!(record.details["stderr"], "Error: bad template");
        assert_eq!(record.details["exitCode"], "1");
    }

    #[test]
    fn test_failed_step_is_folded_with_partial_info() {
        let mut record = DeploymentRecord::new("demo", "demo-stack", "us-east-1");
        let result = StepResult::failed(StepName::CustomDomain, "timeout")
            .with_info("CertificateArn", "arn:cert");
        fold_step_result(&mut record, &result);

        assert_eq!(record.outputs["CertificateArn"], "arn:cert");
        let entry = record.resource("CustomDomain").unwrap();
        assert_eq!(entry.status, "FAILED");
    }
}
