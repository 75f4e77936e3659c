//! Deployment record storage

pub mod file;
pub mod memory;
pub mod records;

use async_trait::async_trait;
use launchpad_models::{DeploymentRecord, ProgressEntry};

use crate::errors::DeployError;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;
pub use records::Records;

/// Durable keyed storage for deployment records.
///
/// The progress log is a separate append-only stream: `save` persists every
/// field except `progress_log`, which only grows through `append_progress`.
/// `load` returns the record with its full progress log.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load a record by project name
    async fn load(&self, project_name: &str) -> Result<Option<DeploymentRecord>, DeployError>;

    /// Persist a record, last write wins
    async fn save(&self, record: &DeploymentRecord) -> Result<(), DeployError>;

    /// Append one entry to a project's progress stream
    async fn append_progress(
        &self,
        project_name: &str,
        entry: &ProgressEntry,
    ) -> Result<(), DeployError>;

    /// Every stored record
    async fn list(&self) -> Result<Vec<DeploymentRecord>, DeployError>;

    /// Get storage type identifier
    fn store_type(&self) -> &'static str;
}
