//! Read side for callers
//!
//! Reads never write, except that a record older than the staleness window
//! is refreshed through the reconciler before it is returned.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use launchpad_models::{DeploymentRecord, DeploymentStatus};
use tracing::warn;

use crate::errors::DeployError;
use crate::reconcile::StatusReconciler;
use crate::store::Records;

/// Concurrent refreshes while listing
const LIST_REFRESH_CONCURRENCY: usize = 4;

/// Result of a status lookup
#[derive(Debug, Clone)]
pub enum DeploymentLookup {
    Found(DeploymentRecord),
    /// Nothing is known under this project name
    NotFound(String),
}

impl DeploymentLookup {
    pub fn status(&self) -> DeploymentStatus {
        match self {
            DeploymentLookup::Found(record) => record.status,
            DeploymentLookup::NotFound(_) => DeploymentStatus::NotFound,
        }
    }

    pub fn into_record(self) -> Option<DeploymentRecord> {
        match self {
            DeploymentLookup::Found(record) => Some(record),
            DeploymentLookup::NotFound(_) => None,
        }
    }
}

/// Status and listing queries
pub struct QueryService {
    records: Arc<Records>,
    reconciler: Arc<StatusReconciler>,
    stale_after: Option<Duration>,
}

impl QueryService {
    /// `stale_after` of `None` disables refresh on read
    pub fn new(records: Arc<Records>, reconciler: Arc<StatusReconciler>, stale_after: Option<Duration>) -> Self {
        Self {
            records,
            reconciler,
            stale_after,
        }
    }

    fn is_stale(&self, record: &DeploymentRecord) -> bool {
        let Some(stale_after) = self.stale_after else {
            return false;
        };
        let age = Utc::now().signed_duration_since(record.last_updated);
        age.to_std().map(|age| age > stale_after).unwrap_or(false)
    }

    /// Refresh `record` if stale. Refresh failures fall back to the stored record.
    async fn fresh(&self, record: DeploymentRecord) -> DeploymentRecord {
        if !self.is_stale(&record) {
            return record;
        }
        match self.reconciler.reconcile(&record.project_name).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!("Refresh of {} failed, serving stored record: {}", record.project_name, e);
                record
            }
        }
    }

    /// Latest known status of one project
    pub async fn get_deployment_status(&self, project_name: &str) -> Result<DeploymentLookup, DeployError> {
        match self.records.get(project_name).await? {
            Some(record) => Ok(DeploymentLookup::Found(self.fresh(record).await)),
            None => Ok(DeploymentLookup::NotFound(project_name.to_string())),
        }
    }

    /// Every known deployment, ordered by project name
    pub async fn list_deployments(&self) -> Result<Vec<DeploymentRecord>, DeployError> {
        let records = self.records.list().await?;
        Ok(stream::iter(records)
            .map(|record| self.fresh(record))
            .buffered(LIST_REFRESH_CONCURRENCY)
            .collect()
            .await)
    }

    /// Reconcile now, whatever the record's age
    pub async fn refresh(&self, project_name: &str) -> Result<DeploymentRecord, DeployError> {
        self.reconciler.reconcile(project_name).await
    }
}
