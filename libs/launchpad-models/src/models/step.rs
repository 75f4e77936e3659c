//! Provisioning step results

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Optional provisioning steps run after the base stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    FrontendUpload,
    Database,
    CustomDomain,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::FrontendUpload => "frontend_upload",
            StepName::Database => "database",
            StepName::CustomDomain => "custom_domain",
        }
    }

    /// Logical id used for the step's entry in the record's resources
    pub fn logical_id(&self) -> &'static str {
        match self {
            StepName::FrontendUpload => "FrontendAssets",
            StepName::Database => "Database",
            StepName::CustomDomain => "CustomDomain",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<StepName> for String {
    fn from(step: StepName) -> Self {
        step.as_str().to_string()
    }
}

/// Outcome of one provisioning step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_name: StepName,

    pub success: bool,

    /// Opaque handle to the provisioned resource, e.g. an ARN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,

    /// Free-form connection details. Kept on failure for whatever was
    /// obtained before the failing sub-stage.
    #[serde(default)]
    pub connection_info: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn succeeded(step_name: StepName) -> Self {
        Self {
            step_name,
            success: true,
            resource_id: None,
            resource_type: None,
            connection_info: BTreeMap::new(),
            error: None,
        }
    }

    pub fn failed(step_name: StepName, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::succeeded(step_name)
        }
    }

    pub fn with_resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.connection_info.insert(key.into(), value.into());
        self
    }
}
