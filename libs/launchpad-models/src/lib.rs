//! Launchpad data models
//!
//! Wire and persisted shapes shared by the launchpad service and its clients.

pub mod models;

pub use models::api::{
    DeploymentListResponse, ErrorResponse, HealthResponse, NotFoundResponse, VersionResponse,
};
pub use models::record::{
    DeploymentRecord, DeploymentStatus, ProgressEntry, RecordError, ResourceEntry,
};
pub use models::request::{
    BackendConfig, DatabaseConfig, DeploymentRequest, DeploymentType, DomainConfig,
    DynamoDbConfig, FrontendConfig, KeyAttribute, RelationalConfig, RelationalDialect,
};
pub use models::step::{StepName, StepResult};
