//! Launchpad Library
//!
//! Deployment orchestration, status reconciliation and the query API for
//! serverless web applications.

pub mod app;
pub mod cloud;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod query;
pub mod reconcile;
pub mod server;
pub mod storage;
pub mod store;
pub mod utils;
pub mod workers;
