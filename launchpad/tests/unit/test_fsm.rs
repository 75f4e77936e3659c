//! FSM unit tests

use launchpad::deploy::fsm::{AttemptEvent, AttemptState, DeploymentFsm};
use launchpad_models::DeploymentStatus;

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), AttemptState::Accepted);
    assert_eq!(fsm.status(), DeploymentStatus::InProgress);
    assert!(fsm.error().is_none());
    assert!(fsm.failed_steps().is_empty());
}

#[test]
fn test_fsm_partial_flow() {
    let mut fsm = DeploymentFsm::new();

    // Accepted -> ApplyingStack
    fsm.process(AttemptEvent::ApplyStack).unwrap();
    assert_eq!(fsm.state(), AttemptState::ApplyingStack);

    // ApplyingStack -> ProvisioningSteps
    fsm.process(AttemptEvent::StackApplied).unwrap();
    assert_eq!(fsm.state(), AttemptState::ProvisioningSteps);

    // ProvisioningSteps -> Partial
    fsm.process(AttemptEvent::StepsFinished(vec!["database".to_string()]))
        .unwrap();
    assert_eq!(fsm.state(), AttemptState::Partial);
    assert_eq!(fsm.status(), DeploymentStatus::Partial);
    assert_eq!(fsm.failed_steps(), ["database".to_string()]);
    assert!(fsm.error().unwrap().contains("database"));
}

#[test]
fn test_fsm_stack_failure_flow() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(AttemptEvent::ApplyStack).unwrap();
    fsm.process(AttemptEvent::StackFailed("exit code 1".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), AttemptState::Failed);
    assert_eq!(fsm.status(), DeploymentStatus::Failed);
    assert_eq!(fsm.error(), Some("exit code 1"));
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = DeploymentFsm::new();

    // Cannot finish steps before the stack is applied
    let result = fsm.process(AttemptEvent::StepsFinished(vec![]));
    assert!(result.is_err());
    assert_eq!(fsm.state(), AttemptState::Accepted);

    // Terminal states accept nothing
    fsm.process(AttemptEvent::ApplyStack).unwrap();
    fsm.process(AttemptEvent::StackApplied).unwrap();
    fsm.process(AttemptEvent::StepsFinished(vec![])).unwrap();
    assert_eq!(fsm.status(), DeploymentStatus::Completed);
    assert!(fsm.process(AttemptEvent::ApplyStack).is_err());
}
