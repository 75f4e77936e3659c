//! Keyed record access with per-project write serialization

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use launchpad_models::{DeploymentRecord, ProgressEntry};
use tokio::sync::Mutex as AsyncMutex;

use crate::errors::DeployError;
use crate::store::RecordStore;

/// Shared record access for the orchestrator, reconciler and query API.
///
/// Writers for the same project are serialized by a per-project lock; writers
/// for different projects never wait on each other. Every write keeps
/// `last_updated` from going backwards.
pub struct Records {
    store: Arc<dyn RecordStore>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Records {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Storage backend identifier
    pub fn store_type(&self) -> &'static str {
        self.store.store_type()
    }

    fn lock_for(&self, project_name: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(project_name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Read the latest record
    pub async fn get(&self, project_name: &str) -> Result<Option<DeploymentRecord>, DeployError> {
        self.store.load(project_name).await
    }

    /// Every record, ordered by project name
    pub async fn list(&self) -> Result<Vec<DeploymentRecord>, DeployError> {
        self.store.list().await
    }

    /// Apply `f` to an existing record and persist it
    pub async fn update<F>(&self, project_name: &str, f: F) -> Result<DeploymentRecord, DeployError>
    where
        F: FnOnce(&mut DeploymentRecord) + Send,
    {
        let lock = self.lock_for(project_name);
        let _guard = lock.lock().await;

        let mut record = self
            .store
            .load(project_name)
            .await?
            .ok_or_else(|| DeployError::NotFound(project_name.to_string()))?;
        let previous = record.last_updated;
        f(&mut record);
        record.last_updated = Utc::now().max(previous);
        self.store.save(&record).await?;
        Ok(record)
    }

    /// Apply `f` to the existing record, or to `init()` when there is none, and persist it
    pub async fn upsert<I, F>(
        &self,
        project_name: &str,
        init: I,
        f: F,
    ) -> Result<DeploymentRecord, DeployError>
    where
        I: FnOnce() -> DeploymentRecord + Send,
        F: FnOnce(&mut DeploymentRecord) + Send,
    {
        let lock = self.lock_for(project_name);
        let _guard = lock.lock().await;

        let (mut record, previous) = match self.store.load(project_name).await? {
            Some(record) => {
                let previous = record.last_updated;
                (record, Some(previous))
            }
            None => (init(), None),
        };
        f(&mut record);
        let now = Utc::now();
        record.last_updated = previous.map_or(now, |p| now.max(p));
        self.store.save(&record).await?;
        Ok(record)
    }

    /// Append to the project's progress log
    pub async fn append_progress(
        &self,
        project_name: &str,
        entry: &ProgressEntry,
    ) -> Result<(), DeployError> {
        let lock = self.lock_for(project_name);
        let _guard = lock.lock().await;
        self.store.append_progress(project_name, entry).await
    }
}
