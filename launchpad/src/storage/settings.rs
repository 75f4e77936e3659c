//! Settings file management

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Launchpad settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily rolling log files here
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Query API server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Storage base directory, defaults to `~/.launchpad`
    #[serde(default)]
    pub storage_dir: Option<String>,

    /// Template directory, defaults to `<storage_dir>/templates`
    #[serde(default)]
    pub templates_dir: Option<String>,

    /// Region used when a request does not name one
    #[serde(default = "default_region")]
    pub default_region: String,

    /// Which cloud backend performs provisioning
    #[serde(default)]
    pub cloud_backend: CloudBackendKind,

    /// AWS CLI profile
    #[serde(default)]
    pub aws_profile: Option<String>,

    /// Reconciliation configuration
    #[serde(default)]
    pub reconcile: ReconcileSettings,

    /// Wait loop configuration
    #[serde(default)]
    pub waits: WaitSettings,
}

fn default_true() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_dir: None,
            server: ServerSettings::default(),
            storage_dir: None,
            templates_dir: None,
            default_region: default_region(),
            cloud_backend: CloudBackendKind::default(),
            aws_profile: None,
            reconcile: ReconcileSettings::default(),
            waits: WaitSettings::default(),
        }
    }
}

/// Cloud backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudBackendKind {
    /// Real AWS through the AWS and SAM CLIs
    #[default]
    Aws,

    /// Deterministic in-memory cloud
    Simulated,
}

impl FromStr for CloudBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws" => Ok(CloudBackendKind::Aws),
            "simulated" | "sim" => Ok(CloudBackendKind::Simulated),
            _ => Err(format!("Invalid cloud backend: {}", s)),
        }
    }
}

/// Query API server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Run the background reconciliation worker
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval between background passes
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    /// A status read older than this triggers a refresh
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_reconcile_interval() -> u64 {
    30
}

fn default_stale_after() -> u64 {
    15
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reconcile_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}

/// Wait loop settings for long-running resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitSettings {
    /// Upper bound between two polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_long_timeout")]
    pub certificate_timeout_secs: u64,

    #[serde(default = "default_long_timeout")]
    pub database_timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_long_timeout() -> u64 {
    1800
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            certificate_timeout_secs: default_long_timeout(),
            database_timeout_secs: default_long_timeout(),
        }
    }
}
