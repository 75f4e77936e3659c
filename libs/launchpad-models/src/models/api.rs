//! Query API models

use serde::{Deserialize, Serialize};

use crate::models::record::{DeploymentRecord, DeploymentStatus};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Deployment list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentListResponse {
    pub deployments: Vec<DeploymentRecord>,
    pub total: usize,
}

/// Body returned when no deployment exists under a project name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundResponse {
    pub project_name: String,
    pub status: DeploymentStatus,
}

impl NotFoundResponse {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            status: DeploymentStatus::NotFound,
        }
    }
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error class, e.g. `validation`
    pub error: String,
    pub message: String,
}
