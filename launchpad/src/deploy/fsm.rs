//! Finite state machine for one deployment attempt

use launchpad_models::DeploymentStatus;
use serde::{Deserialize, Serialize};

/// Phase of a deployment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// Record created, nothing applied yet
    Accepted,

    /// Base stack apply running
    ApplyingStack,

    /// Base stack is live, optional steps running
    ProvisioningSteps,

    /// Every step succeeded
    Completed,

    /// Base stack is live, at least one optional step failed
    Partial,

    /// Base stack failed
    Failed,
}

/// Attempt event
#[derive(Debug, Clone)]
pub enum AttemptEvent {
    /// Start applying the base stack
    ApplyStack,

    /// Base stack applied
    StackApplied,

    /// Base stack apply failed
    StackFailed(String),

    /// All optional steps finished, with the names of the failed ones
    StepsFinished(Vec<String>),
}

/// Deployment attempt FSM.
///
/// Status only moves forward within an attempt; a redeploy starts a new FSM.
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: AttemptState,
    error: Option<String>,
    failed_steps: Vec<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in accepted state
    pub fn new() -> Self {
        Self {
            state: AttemptState::Accepted,
            error: None,
            failed_steps: Vec::new(),
        }
    }

    /// Get current state
    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Names of the optional steps that failed
    pub fn failed_steps(&self) -> &[String] {
        &self.failed_steps
    }

    /// Record status corresponding to the current state
    pub fn status(&self) -> DeploymentStatus {
        match self.state {
            AttemptState::Accepted
            | AttemptState::ApplyingStack
            | AttemptState::ProvisioningSteps => DeploymentStatus::InProgress,
            AttemptState::Completed => DeploymentStatus::Completed,
            AttemptState::Partial => DeploymentStatus::Partial,
            AttemptState::Failed => DeploymentStatus::Failed,
        }
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: AttemptEvent) -> Result<(), String> {
        let new_state = match (&self.state, &event) {
            (AttemptState::Accepted, AttemptEvent::ApplyStack) => AttemptState::ApplyingStack,

            (AttemptState::ApplyingStack, AttemptEvent::StackApplied) => {
                AttemptState::ProvisioningSteps
            }
            (AttemptState::ApplyingStack, AttemptEvent::StackFailed(err)) => {
                self.error = Some(err.clone());
                AttemptState::Failed
            }

            (AttemptState::ProvisioningSteps, AttemptEvent::StepsFinished(failed)) => {
                if failed.is_empty() {
                    AttemptState::Completed
                } else {
                    self.failed_steps = failed.clone();
                    self.error = Some(format!("Optional steps failed: {}", failed.join(", ")));
                    AttemptState::Partial
                }
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_success_path() {
        let mut fsm = DeploymentFsm::new();
        assert_eq!(fsm.status(), DeploymentStatus::InProgress);

        fsm.process(AttemptEvent::ApplyStack).unwrap();
        fsm.process(AttemptEvent::StackApplied).unwrap();
        assert_eq!(fsm.state(), AttemptState::ProvisioningSteps);
        assert_eq!(fsm.status(), DeploymentStatus::InProgress);

        fsm.process(AttemptEvent::StepsFinished(vec![])).unwrap();
        assert_eq!(fsm.status(), DeploymentStatus::Completed);
        assert!(fsm.error().is_none());
    }

    #[test]
    fn test_fsm_stack_failure_is_terminal() {
        let mut fsm = DeploymentFsm::new();
        fsm.process(AttemptEvent::ApplyStack).unwrap();
        fsm.process(AttemptEvent::StackFailed("exit 1".to_string()))
            .unwrap();

        assert_eq!(fsm.status(), DeploymentStatus::Failed);
        assert_eq!(fsm.error(), Some("exit 1"));
        assert!(fsm.process(AttemptEvent::StepsFinished(vec![])).is_err());
    }
}
