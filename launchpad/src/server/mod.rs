//! Query API

pub mod handlers;
pub mod serve;
pub mod state;

pub use serve::{router, serve};
pub use state::ServerState;
