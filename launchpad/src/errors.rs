//! Error types for launchpad

use thiserror::Error;

/// Main error type for launchpad
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("No template for {deployment_type}/{framework}")]
    TemplateNotFound {
        deployment_type: String,
        framework: String,
    },

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Stack apply failed with exit code {exit_code}: {stderr}")]
    StackApplyError {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },

    #[error("Step {step} failed: {message}")]
    StepError { step: String, message: String },

    #[error("Status query failed: {0}")]
    ReconcileQueryError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Deployment already in progress: {0}")]
    AlreadyInProgress(String),

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Stable error class used in records and API bodies
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::IoError(_) => "io",
            DeployError::JsonError(_) => "json",
            DeployError::YamlError(_) => "yaml",
            DeployError::ValidationError(_) => "validation",
            DeployError::TemplateNotFound { .. } => "template_not_found",
            DeployError::TemplateError(_) => "template",
            DeployError::StackApplyError { .. } => "stack_apply",
            DeployError::StepError { .. } => "step",
            DeployError::ReconcileQueryError(_) => "reconcile_query",
            DeployError::NotFound(_) => "not_found",
            DeployError::AlreadyInProgress(_) => "already_in_progress",
            DeployError::CommandError(_) => "command",
            DeployError::StorageError(_) => "storage",
            DeployError::ConfigError(_) => "config",
            DeployError::ServerError(_) => "server",
            DeployError::ShutdownError(_) => "shutdown",
            DeployError::Internal(_) => "internal",
        }
    }

    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        DeployError::StepError {
            step: step.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(err.to_string())
    }
}

impl From<handlebars::RenderError> for DeployError {
    fn from(err: handlebars::RenderError) -> Self {
        DeployError::TemplateError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use launchpad_models::StepName;

    #[test]
    fn test_step_error_carries_step_name() {
        let err = DeployError::step(StepName::CustomDomain, "base stack produced no distribution output");
        assert_eq!(err.kind(), "step");
        assert_eq!(
            err.to_string(),
            "Step custom_domain failed: base stack produced no distribution output"
        );
    }
}
