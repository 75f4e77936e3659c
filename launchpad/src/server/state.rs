//! Server state

use std::sync::Arc;

use crate::deploy::Orchestrator;
use crate::query::QueryService;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
    pub query: Arc<QueryService>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<Orchestrator>, query: Arc<QueryService>) -> Self {
        Self { orchestrator, query }
    }
}
