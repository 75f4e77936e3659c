//! Deployment record models

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::request::DeploymentType;

/// Reconciled deployment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    InProgress,
    Completed,
    Failed,
    /// Base stack is live but an optional step failed
    Partial,
    Deleted,
    Unknown,
    /// Nothing is deployed under this name
    NotFound,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::InProgress => "in_progress",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Partial => "partial",
            DeploymentStatus::Deleted => "deleted",
            DeploymentStatus::Unknown => "unknown",
            DeploymentStatus::NotFound => "not_found",
        }
    }

    /// Whether no further change is expected without a new attempt
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeploymentStatus::InProgress | DeploymentStatus::Unknown)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource of the deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub logical_id: String,

    #[serde(rename = "type")]
    pub resource_type: String,

    /// Native status string as reported by the control plane
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_id: Option<String>,

    pub last_updated: DateTime<Utc>,
}

/// A timestamped, human readable progress message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl ProgressEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

/// Structured failure attached to a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    /// Error class, e.g. `stack_apply` or `step`
    pub kind: String,

    pub message: String,

    /// Failed steps, when the failure comes from provisioning steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_steps: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl RecordError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            failed_steps: Vec::new(),
            details: BTreeMap::new(),
        }
    }
}

/// Current known state of one project's deployment.
///
/// One record per project, last write wins. The progress log is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub project_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<DeploymentType>,

    pub region: String,

    /// Identifies the orchestration attempt that last reset this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt_id: Option<String>,

    pub status: DeploymentStatus,

    pub stack_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_id: Option<String>,

    #[serde(default)]
    pub outputs: BTreeMap<String, String>,

    #[serde(default)]
    pub resources: Vec<ResourceEntry>,

    #[serde(default)]
    pub progress_log: Vec<ProgressEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordError>,

    pub created_at: DateTime<Utc>,

    pub last_updated: DateTime<Utc>,
}

impl DeploymentRecord {
    /// A fresh in-progress record
    pub fn new(project_name: impl Into<String>, stack_name: impl Into<String>, region: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            project_name: project_name.into(),
            deployment_type: None,
            region: region.into(),
            attempt_id: None,
            status: DeploymentStatus::InProgress,
            stack_name: stack_name.into(),
            stack_id: None,
            outputs: BTreeMap::new(),
            resources: Vec::new(),
            progress_log: Vec::new(),
            error: None,
            created_at: now,
            last_updated: now,
        }
    }

    /// Sentinel returned when nothing is deployed under `project_name`
    pub fn not_found(project_name: impl Into<String>, stack_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            status: DeploymentStatus::NotFound,
            ..Self::new(project_name, stack_name, region)
        }
    }

    /// Merge outputs, newer values win on the same key
    pub fn merge_outputs<I>(&mut self, outputs: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in outputs {
            self.outputs.insert(key, value);
        }
    }

    /// Insert or replace a resource by logical id, keeping order of first appearance
    pub fn upsert_resource(&mut self, entry: ResourceEntry) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.logical_id == entry.logical_id)
        {
            Some(existing) => *existing = entry,
            None => self.resources.push(entry),
        }
    }

    /// Look up a resource by logical id
    pub fn resource(&self, logical_id: &str) -> Option<&ResourceEntry> {
        self.resources.iter().find(|r| r.logical_id == logical_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, status: &str) -> ResourceEntry {
        ResourceEntry {
            logical_id: id.to_string(),
            resource_type: "AWS::Lambda::Function".to_string(),
            status: status.to_string(),
            physical_id: None,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&DeploymentStatus::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
        let status: DeploymentStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, DeploymentStatus::InProgress);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!DeploymentStatus::InProgress.is_terminal());
        assert!(!DeploymentStatus::Unknown.is_terminal());
        assert!(DeploymentStatus::Partial.is_terminal());
        assert!(DeploymentStatus::NotFound.is_terminal());
    }

    #[test]
    fn test_record_uses_camel_case_fields() {
        let record = DeploymentRecord::new("demo", "demo-stack", "us-east-1");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["projectName"], "demo");
        assert_eq!(value["stackName"], "demo-stack");
        assert_eq!(value["status"], "in_progress");
        assert!(value.get("progressLog").is_some());
        assert!(value.get("lastUpdated").is_some());
    }

    #[test]
    fn test_upsert_resource_replaces_in_place() {
        let mut record = DeploymentRecord::new("demo", "demo-stack", "us-east-1");
        record.upsert_resource(entry("Api", "CREATE_IN_PROGRESS"));
        record.upsert_resource(entry("Bucket", "CREATE_IN_PROGRESS"));
        record.upsert_resource(entry("Api", "CREATE_COMPLETE"));

        assert_eq!(record.resources.len(), 2);
        assert_eq!(record.resources[0].logical_id, "Api");
        assert_eq!(record.resources[0].status, "CREATE_COMPLETE");
    }
}
