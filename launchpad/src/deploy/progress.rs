//! Progress event sink
//!
//! One call site per message: `emit` logs through tracing and queues the
//! entry for the project's progress log. Entries are timestamped and queued
//! under one lock, so queue order and timestamp order always agree.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use launchpad_models::ProgressEntry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::store::Records;

struct SinkInner {
    tx: Option<mpsc::UnboundedSender<ProgressEntry>>,
    last: DateTime<Utc>,
}

/// Cloneable progress callback handed to the stack deployer and steps
#[derive(Clone)]
pub struct ProgressSink {
    project_name: Arc<str>,
    inner: Arc<Mutex<SinkInner>>,
}

impl ProgressSink {
    /// A sink and the receiving end of its queue
    pub fn channel(project_name: &str) -> (Self, mpsc::UnboundedReceiver<ProgressEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_sender(project_name, Some(tx)), rx)
    }

    /// A sink that only logs
    pub fn detached(project_name: &str) -> Self {
        Self::with_sender(project_name, None)
    }

    fn with_sender(project_name: &str, tx: Option<mpsc::UnboundedSender<ProgressEntry>>) -> Self {
        Self {
            project_name: Arc::from(project_name),
            inner: Arc::new(Mutex::new(SinkInner {
                tx,
                last: DateTime::<Utc>::MIN_UTC,
            })),
        }
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Emit one progress message
    pub fn emit(&self, message: impl Into<String>) {
        let message = message.into();
        info!(project = %self.project_name, "{}", message);

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let timestamp = Utc::now().max(inner.last);
        inner.last = timestamp;
        if let Some(tx) = &inner.tx {
            let _ = tx.send(ProgressEntry { timestamp, message });
        }
    }

    /// Stop queueing; the forwarder drains what is queued and exits
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.tx = None;
    }
}

/// Append queued entries to the project's progress log, in order, until the sink closes
pub fn spawn_forwarder(
    records: Arc<Records>,
    project_name: String,
    mut rx: mpsc::UnboundedReceiver<ProgressEntry>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(entry) = rx.recv().await {
            if let Err(e) = records.append_progress(&project_name, &entry).await {
                warn!("Failed to append progress for {}: {}", project_name, e);
            }
        }
    })
}
