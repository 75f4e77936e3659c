//! In-memory record store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use launchpad_models::{DeploymentRecord, ProgressEntry};

use crate::errors::DeployError;
use crate::store::RecordStore;

/// Record store held in process memory
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, DeploymentRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self, project_name: &str) -> Result<Option<DeploymentRecord>, DeployError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(project_name).cloned())
    }

    async fn save(&self, record: &DeploymentRecord) -> Result<(), DeployError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let progress_log = records
            .remove(&record.project_name)
            .map(|existing| existing.progress_log)
            .unwrap_or_default();

        let mut stored = record.clone();
        stored.progress_log = progress_log;
        records.insert(record.project_name.clone(), stored);
        Ok(())
    }

    async fn append_progress(
        &self,
        project_name: &str,
        entry: &ProgressEntry,
    ) -> Result<(), DeployError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        match records.get_mut(project_name) {
            Some(record) => {
                record.progress_log.push(entry.clone());
                Ok(())
            }
            None => Err(DeployError::NotFound(project_name.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<DeploymentRecord>, DeployError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by(|a, b| a.project_name.cmp(&b.project_name));
        Ok(all)
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_keeps_progress_stream() {
        let store = MemoryRecordStore::new();
        let mut record = DeploymentRecord::new("demo", "demo-stack", "us-east-1");
        store.save(&record).await.unwrap();
        store
            .append_progress("demo", &ProgressEntry::now("started"))
            .await
            .unwrap();

        // A save carrying a stale (empty) progress log must not erase the stream
        record.stack_id = Some("arn:stack".to_string());
        store.save(&record).await.unwrap();

        let loaded = store.load("demo").await.unwrap().unwrap();
        assert_eq!(loaded.stack_id.as_deref(), Some("arn:stack"));
        assert_eq!(loaded.progress_log.len(), 1);
    }

    #[tokio::test]
    async fn test_append_to_missing_record_fails() {
        let store = MemoryRecordStore::new();
        let result = store.append_progress("ghost", &ProgressEntry::now("hi")).await;
        assert!(matches!(result, Err(DeployError::NotFound(_))));
    }
}
