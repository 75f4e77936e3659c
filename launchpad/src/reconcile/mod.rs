//! Status reconciliation
//!
//! Brings a stored record in line with what the control plane reports. The
//! control plane is queried outside any lock; the answer is merged inside
//! the per-project write so a concurrent orchestrator write is never lost.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use launchpad_models::{DeploymentRecord, DeploymentStatus, ProgressEntry, RecordError, ResourceEntry};
use tracing::{debug, info, warn};

use crate::cloud::{StackDescription, StackLookup, StackQuery};
use crate::deploy::active::ActiveDeployments;
use crate::errors::DeployError;
use crate::store::Records;

/// Native status fragments, checked in order
const STATUS_PATTERNS: &[(&str, DeploymentStatus)] = &[
    ("IN_PROGRESS", DeploymentStatus::InProgress),
    ("FAILED", DeploymentStatus::Failed),
    ("ROLLBACK", DeploymentStatus::Failed),
    ("DELETE", DeploymentStatus::Deleted),
    ("COMPLETE", DeploymentStatus::Completed),
];

/// Map a native stack status onto the record vocabulary.
///
/// Case-insensitive substring match, first hit wins: pending operations are
/// in progress, failures and rollbacks are failed, deletes are deleted,
/// other completions are completed, the rest is unknown.
pub fn map_native_status(native_status: &str) -> DeploymentStatus {
    let upper = native_status.to_ascii_uppercase();
    STATUS_PATTERNS
        .iter()
        .find(|(pattern, _)| upper.contains(pattern))
        .map(|(_, status)| *status)
        .unwrap_or(DeploymentStatus::Unknown)
}

/// Refreshes records from the control plane
pub struct StatusReconciler {
    records: Arc<Records>,
    query: Arc<dyn StackQuery>,
    active: Arc<ActiveDeployments>,
    default_region: String,
}

impl StatusReconciler {
    pub fn new(
        records: Arc<Records>,
        query: Arc<dyn StackQuery>,
        active: Arc<ActiveDeployments>,
        default_region: impl Into<String>,
    ) -> Self {
        Self {
            records,
            query,
            active,
            default_region: default_region.into(),
        }
    }

    /// Reconcile one project.
    ///
    /// A failed query leaves the record untouched. A stack that does not
    /// exist yields a `not_found` record; it is only stored when a record
    /// already existed and no attempt is pending.
    pub async fn reconcile(&self, project_name: &str) -> Result<DeploymentRecord, DeployError> {
        self.refresh(project_name, false).await
    }

    /// Reconcile, and also settle an abandoned attempt.
    ///
    /// An `in_progress` record with no live run whose stack never appeared
    /// becomes `failed`. Only the process owning every run on this storage
    /// (the server) may call this, since other processes cannot see its runs.
    pub async fn settle(&self, project_name: &str) -> Result<DeploymentRecord, DeployError> {
        self.refresh(project_name, true).await
    }

    async fn refresh(&self, project_name: &str, settle_abandoned: bool) -> Result<DeploymentRecord, DeployError> {
        let existing = self.records.get(project_name).await?;
        let (stack_name, region) = match &existing {
            Some(record) => (record.stack_name.clone(), record.region.clone()),
            None => (format!("{}-stack", project_name), self.default_region.clone()),
        };

        let fetched_at = Utc::now();
        let lookup = self
            .query
            .describe_stack(&stack_name, &region)
            .await
            .map_err(|e| match e {
                DeployError::ReconcileQueryError(_) => e,
                other => DeployError::ReconcileQueryError(other.to_string()),
            })?;

        match lookup {
            StackLookup::NotFound => {
                self.stack_missing(project_name, existing, &stack_name, &region, settle_abandoned)
                    .await
            }
            StackLookup::Found(description) => {
                self.stack_found(project_name, &stack_name, &region, description, fetched_at)
                    .await
            }
        }
    }

    async fn stack_missing(
        &self,
        project_name: &str,
        existing: Option<DeploymentRecord>,
        stack_name: &str,
        region: &str,
        settle_abandoned: bool,
    ) -> Result<DeploymentRecord, DeployError> {
        let Some(record) = existing else {
            return Ok(DeploymentRecord::not_found(project_name, stack_name, region));
        };
        if self.active.contains(project_name) {
            debug!("Stack {} not visible yet for {}", stack_name, project_name);
            return Ok(record);
        }
        if record.status == DeploymentStatus::InProgress {
            if settle_abandoned {
                return self.settle_abandoned(project_name, stack_name).await;
            }
            // The stack may simply not be created yet
            debug!("Stack {} not visible yet for {}", stack_name, project_name);
            return Ok(record);
        }
        // A failure before the stack ever existed stays a failure
        if record.status == DeploymentStatus::Failed && record.stack_id.is_none() {
            return Ok(record);
        }

        let previous = record.status;
        let mut updated = self
            .records
            .update(project_name, |record| {
                if record.status != DeploymentStatus::InProgress {
                    record.status = DeploymentStatus::NotFound;
                    record.outputs.clear();
                    record.resources.clear();
                }
            })
            .await?;
        if previous != updated.status {
            self.note_change(&mut updated, previous, "stack not found").await?;
        }
        Ok(updated)
    }

    /// Fail an attempt that ended with its process, before any stack existed
    async fn settle_abandoned(&self, project_name: &str, stack_name: &str) -> Result<DeploymentRecord, DeployError> {
        let active = &self.active;
        let mut settled = false;
        let mut updated = self
            .records
            .update(project_name, |record| {
                if record.status == DeploymentStatus::InProgress && !active.contains(project_name) {
                    record.status = DeploymentStatus::Failed;
                    record.error = Some(RecordError::new(
                        "interrupted",
                        format!("attempt stopped before stack {} was created", stack_name),
                    ));
                    settled = true;
                }
            })
            .await?;
        if settled {
            warn!("Settled abandoned attempt of {}", project_name);
            self.note_change(&mut updated, DeploymentStatus::InProgress, "attempt abandoned")
                .await?;
        }
        Ok(updated)
    }

    async fn stack_found(
        &self,
        project_name: &str,
        stack_name: &str,
        region: &str,
        description: StackDescription,
        fetched_at: DateTime<Utc>,
    ) -> Result<DeploymentRecord, DeployError> {
        let mapped = map_native_status(&description.native_status);
        let live = self.active.contains(project_name);
        let mut previous = None;

        let mut updated = self
            .records
            .upsert(
                project_name,
                || {
                    let mut record = DeploymentRecord::new(project_name, stack_name, region);
                    record.status = mapped;
                    record
                },
                |record| {
                    previous = Some(record.status);
                    merge_description(record, &description, mapped, live, fetched_at);
                },
            )
            .await?;

        if let Some(previous) = previous.filter(|p| *p != updated.status) {
            self.note_change(&mut updated, previous, &description.native_status)
                .await?;
        }
        Ok(updated)
    }

    /// Log a status change and append it to both the stored and the returned record
    async fn note_change(
        &self,
        record: &mut DeploymentRecord,
        from: DeploymentStatus,
        reason: &str,
    ) -> Result<(), DeployError> {
        info!("Reconciled {}: {} -> {} ({})", record.project_name, from, record.status, reason);
        let entry = ProgressEntry::now(format!(
            "Status reconciled: {} -> {} ({})",
            from, record.status, reason
        ));
        self.records.append_progress(&record.project_name, &entry).await?;
        record.progress_log.push(entry);
        Ok(())
    }
}

/// Merge a control-plane snapshot taken at `fetched_at` into `record`.
///
/// Nothing is removed. Values written locally after the snapshot was taken
/// win over the snapshot. The status is left alone while an attempt is live,
/// and a partial deployment stays partial when the stack itself completed.
pub fn merge_description(
    record: &mut DeploymentRecord,
    description: &StackDescription,
    mapped: DeploymentStatus,
    live: bool,
    fetched_at: DateTime<Utc>,
) {
    let snapshot_is_current = record.last_updated <= fetched_at;

    if record.stack_id.is_none() {
        record.stack_id = description.stack_id.clone();
    }

    for (key, value) in &description.outputs {
        if snapshot_is_current || !record.outputs.contains_key(key) {
            record.outputs.insert(key.clone(), value.clone());
        }
    }

    for resource in &description.resources {
        let newer_locally = record
            .resource(&resource.logical_id)
            .is_some_and(|entry| entry.last_updated > fetched_at);
        if newer_locally {
            continue;
        }
        record.upsert_resource(ResourceEntry {
            logical_id: resource.logical_id.clone(),
            resource_type: resource.resource_type.clone(),
            status: resource.status.clone(),
            physical_id: resource.physical_id.clone(),
            last_updated: fetched_at,
        });
    }

    let keep_partial =
        record.status == DeploymentStatus::Partial && mapped == DeploymentStatus::Completed;
    if !live && snapshot_is_current && !keep_partial {
        record.status = mapped;
    }
}
