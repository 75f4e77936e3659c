//! Registry of running orchestrations

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::task::AbortHandle;

/// Projects with a live orchestration, one per project
#[derive(Default)]
pub struct ActiveDeployments {
    runs: Mutex<HashMap<String, Option<AbortHandle>>>,
}

impl ActiveDeployments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the project; false when a run already holds it
    pub fn try_register(&self, project_name: &str) -> bool {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        if runs.contains_key(project_name) {
            return false;
        }
        runs.insert(project_name.to_string(), None);
        true
    }

    /// Attach the task handle, unless the run already finished
    pub fn attach(&self, project_name: &str, handle: AbortHandle) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = runs.get_mut(project_name) {
            *slot = Some(handle);
        }
    }

    /// Release the project
    pub fn finish(&self, project_name: &str) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.remove(project_name);
    }

    pub fn contains(&self, project_name: &str) -> bool {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.contains_key(project_name)
    }

    pub fn len(&self) -> usize {
        let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every live run. Their records keep their last written state.
    pub fn abort_all(&self) -> usize {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        let count = runs.len();
        for (_, handle) in runs.drain() {
            if let Some(handle) = handle {
                handle.abort();
            }
        }
        count
    }
}
