//! Launchpad unit test suite

mod common;
mod test_database_step;
mod test_domain_step;
mod test_frontend_step;
mod test_fsm;
mod test_orchestrator;
mod test_query;
mod test_reconciler;
mod test_server;
mod test_store;
