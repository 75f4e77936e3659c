//! Background reconciliation worker

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use launchpad_models::DeploymentStatus;
use tracing::{debug, error, info};

use crate::deploy::ActiveDeployments;
use crate::reconcile::StatusReconciler;
use crate::store::Records;

/// Reconcile worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between passes
    pub interval: Duration,

    /// Initial delay before the first pass
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Whether a record needs the control plane's view
fn needs_reconcile(status: DeploymentStatus) -> bool {
    matches!(status, DeploymentStatus::InProgress | DeploymentStatus::Unknown)
}

/// One pass over the stored records. Returns how many were reconciled.
pub async fn reconcile_pass(
    records: &Records,
    reconciler: &StatusReconciler,
    active: &ActiveDeployments,
) -> usize {
    let candidates = match records.list().await {
        Ok(list) => list,
        Err(e) => {
            error!("Unable to list deployment records: {}", e);
            return 0;
        }
    };

    let mut reconciled = 0;
    for record in candidates {
        if !needs_reconcile(record.status) || active.contains(&record.project_name) {
            continue;
        }
        match reconciler.settle(&record.project_name).await {
            Ok(updated) => {
                debug!("Reconciled {}: {}", updated.project_name, updated.status);
                reconciled += 1;
            }
            Err(e) => {
                error!("Reconcile of {} failed: {}", record.project_name, e);
            }
        }
    }
    reconciled
}

/// Run the reconcile worker
pub async fn run<S, F>(
    options: &Options,
    records: &Records,
    reconciler: &StatusReconciler,
    active: &ActiveDeployments,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Reconcile worker starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Reconcile worker shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    loop {
        let reconciled = reconcile_pass(records, reconciler, active).await;
        if reconciled > 0 {
            info!("Reconcile pass refreshed {} deployment(s)", reconciled);
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Reconcile worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
