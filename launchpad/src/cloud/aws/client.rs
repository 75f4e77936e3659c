//! Command runner for the AWS and SAM CLIs

use std::path::Path;
use std::process::Stdio;

use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DeployError;

/// Captured result of one CLI invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Whether stderr names any of the given error codes or phrases
    pub fn mentions(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.stderr.contains(needle))
    }

    /// Failure as an error carrying the trimmed stderr
    pub fn into_error(self, what: &str) -> DeployError {
        DeployError::CommandError(format!(
            "{} failed with exit code {}: {}",
            what,
            self.exit_code,
            self.stderr.trim()
        ))
    }
}

/// AWS CLI wrapper
pub struct AwsCli {
    aws_program: String,
    sam_program: String,
    profile: Option<String>,
}

impl AwsCli {
    /// Create a runner using `aws` and `sam` from `PATH`
    pub fn new(profile: Option<String>) -> Self {
        Self::with_programs("aws", "sam", profile)
    }

    pub fn with_programs(aws_program: &str, sam_program: &str, profile: Option<String>) -> Self {
        Self {
            aws_program: aws_program.to_string(),
            sam_program: sam_program.to_string(),
            profile: profile.filter(|p| !p.is_empty()),
        }
    }

    async fn run(&self, program: &str, args: &[String], cwd: Option<&Path>) -> Result<CommandOutput, DeployError> {
        debug!("Running {} {}", program, args.join(" "));

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        if let Some(profile) = &self.profile {
            command.env("AWS_PROFILE", profile);
        }

        let output = command
            .output()
            .await
            .map_err(|e| DeployError::CommandError(format!("Failed to run {}: {}", program, e)))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    /// Run `aws <args> --region <region>`, returning the output whatever the exit code
    pub async fn aws(&self, region: &str, args: &[&str]) -> Result<CommandOutput, DeployError> {
        let mut full: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        full.push("--region".to_string());
        full.push(region.to_string());
        self.run(&self.aws_program, &full, None).await
    }

    /// Run an `aws` command with JSON output and parse it
    pub async fn aws_json<T: DeserializeOwned>(&self, region: &str, args: &[&str]) -> Result<T, DeployError> {
        let output = self.aws_json_raw(region, args).await?;
        if !output.success() {
            return Err(output.into_error(&describe(args)));
        }
        Ok(serde_json::from_str(&output.stdout)?)
    }

    /// Run an `aws` command with JSON output, leaving failure handling to the caller
    pub async fn aws_json_raw(&self, region: &str, args: &[&str]) -> Result<CommandOutput, DeployError> {
        let mut full = args.to_vec();
        full.extend_from_slice(&["--output", "json"]);
        self.aws(region, &full).await
    }

    /// Run `sam <args>` in `cwd`
    pub async fn sam(&self, args: &[String], cwd: Option<&Path>) -> Result<CommandOutput, DeployError> {
        self.run(&self.sam_program, args, cwd).await
    }
}

/// `aws s3 sync` style label for error messages
pub fn describe(args: &[&str]) -> String {
    let head: Vec<&str> = args.iter().take(2).copied().collect();
    format!("aws {}", head.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_command_error() {
        let cli = AwsCli::with_programs("/nonexistent/aws", "/nonexistent/sam", None);
        let result = cli.aws("us-east-1", &["sts", "get-caller-identity"]).await;
        assert!(matches!(result, Err(DeployError::CommandError(_))));
    }

    #[test]
    fn test_output_helpers() {
        let output = CommandOutput {
            stdout: String::new(),
            stderr: "An error occurred (ResourceInUseException)\n".to_string(),
            exit_code: 254,
        };
        assert!(!output.success());
        assert!(output.mentions(&["ResourceInUseException"]));
        let err = output.into_error("aws dynamodb create-table");
        assert!(err.to_string().contains("exit code 254"));
        assert_eq!(describe(&["s3", "sync", "dir"]), "aws s3 sync");
    }
}
