//! Deployment module

pub mod active;
pub mod fsm;
pub mod orchestrator;
pub mod progress;
pub mod stack;
pub mod steps;
pub mod template;
pub mod validate;

pub use active::ActiveDeployments;
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use progress::ProgressSink;
