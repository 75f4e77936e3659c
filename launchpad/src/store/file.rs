//! File-backed record store
//!
//! Layout under the records directory:
//! - `<project>.json` holds the record document without its progress log
//! - `<project>.progress.jsonl` holds the progress log, one entry per line

use async_trait::async_trait;
use launchpad_models::{DeploymentRecord, ProgressEntry};
use tracing::warn;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::store::RecordStore;

const RECORD_SUFFIX: &str = ".json";
const PROGRESS_SUFFIX: &str = ".progress.jsonl";

/// Record store persisting JSON documents in a directory
pub struct FileRecordStore {
    dir: Dir,
}

impl FileRecordStore {
    pub fn new(dir: Dir) -> Self {
        Self { dir }
    }

    fn record_file(&self, project_name: &str) -> Result<File, DeployError> {
        check_key(project_name)?;
        Ok(self.dir.file(&format!("{}{}", project_name, RECORD_SUFFIX)))
    }

    fn progress_file(&self, project_name: &str) -> Result<File, DeployError> {
        check_key(project_name)?;
        Ok(self.dir.file(&format!("{}{}", project_name, PROGRESS_SUFFIX)))
    }

    async fn load_progress(&self, project_name: &str) -> Result<Vec<ProgressEntry>, DeployError> {
        let lines = self.progress_file(project_name)?.read_lines().await?;
        let mut entries = Vec::with_capacity(lines.len());
        for line in lines {
            match serde_json::from_str::<ProgressEntry>(&line) {
                Ok(entry) => entries.push(entry),
                // A torn last line after a crash is skipped, earlier history stands
                Err(e) => warn!("Skipping unreadable progress entry for {}: {}", project_name, e),
            }
        }
        Ok(entries)
    }
}

/// Project names become file names, so only a safe character set is accepted
fn check_key(project_name: &str) -> Result<(), DeployError> {
    let valid = !project_name.is_empty()
        && !project_name.starts_with('.')
        && project_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(DeployError::StorageError(format!(
            "Invalid record key: {:?}",
            project_name
        )))
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn load(&self, project_name: &str) -> Result<Option<DeploymentRecord>, DeployError> {
        if check_key(project_name).is_err() {
            return Ok(None);
        }

        let record: Option<DeploymentRecord> = self.record_file(project_name)?.read_json_opt().await?;
        match record {
            Some(mut record) => {
                record.progress_log = self.load_progress(project_name).await?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, record: &DeploymentRecord) -> Result<(), DeployError> {
        let file = self.record_file(&record.project_name)?;
        let mut document = record.clone();
        document.progress_log.clear();
        file.write_json_atomic(&document).await
    }

    async fn append_progress(
        &self,
        project_name: &str,
        entry: &ProgressEntry,
    ) -> Result<(), DeployError> {
        if !self.record_file(project_name)?.exists().await {
            return Err(DeployError::NotFound(project_name.to_string()));
        }
        let line = serde_json::to_string(entry)?;
        self.progress_file(project_name)?.append_line(&line).await
    }

    async fn list(&self) -> Result<Vec<DeploymentRecord>, DeployError> {
        let mut records = Vec::new();
        for path in self.dir.list_files().await? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(project_name) = name.strip_suffix(RECORD_SUFFIX) else {
                continue;
            };
            match self.load(project_name).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable record {}: {}", name, e),
            }
        }
        records.sort_by(|a, b| a.project_name.cmp(&b.project_name));
        Ok(records)
    }

    fn store_type(&self) -> &'static str {
        "file"
    }
}
