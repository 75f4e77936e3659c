//! Model definitions

pub mod api;
pub mod record;
pub mod request;
pub mod step;
