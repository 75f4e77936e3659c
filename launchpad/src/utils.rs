//! Utility functions

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

use crate::errors::DeployError;

/// Version information for launchpad
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Cooldown options for exponential backoff
#[derive(Debug, Clone)]
pub struct CooldownOptions {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for CooldownOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
        }
    }
}

/// Calculate exponential backoff delay
pub fn calc_exp_backoff(options: &CooldownOptions, attempt: u32) -> Duration {
    let delay_secs = options.base_delay.as_secs_f64() * options.multiplier.powi(attempt as i32);
    let capped_delay = delay_secs.min(options.max_delay.as_secs_f64());
    Duration::from_secs_f64(capped_delay)
}

/// Identifier for a new orchestration attempt
pub fn new_attempt_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Result of one poll inside [`wait_until`]
#[derive(Debug)]
pub enum WaitState<T> {
    Ready(T),
    /// Not there yet, with the current native state for logging
    Pending(String),
}

/// Poll `check` with exponential backoff until it reports ready or `timeout` elapses.
///
/// Errors returned by `check` abort the wait immediately.
pub async fn wait_until<T, F, Fut>(
    what: &str,
    timeout: Duration,
    cooldown: &CooldownOptions,
    mut check: F,
) -> Result<T, DeployError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<WaitState<T>, DeployError>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempt = 0;

    loop {
        match check().await? {
            WaitState::Ready(value) => return Ok(value),
            WaitState::Pending(state) => {
                debug!("Waiting for {}: {} (attempt {})", what, state, attempt + 1);
                if Instant::now() >= deadline {
                    return Err(DeployError::CommandError(format!(
                        "Timed out after {:?} waiting for {} (last state: {})",
                        timeout, what, state
                    )));
                }
            }
        }

        let delay = calc_exp_backoff(cooldown, attempt);
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(delay.min(remaining)).await;
        attempt += 1;
    }
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hash(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
