//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::deploy::steps::WaitOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{CloudBackendKind, Settings};
use crate::workers::reconciler;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Template directory override
    pub templates_dir: Option<PathBuf>,

    /// Cloud backend performing provisioning
    pub cloud_backend: CloudBackendKind,

    /// AWS CLI profile
    pub aws_profile: Option<String>,

    /// Region for requests that do not name one
    pub default_region: String,

    /// Enable the query API server
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Enable the background reconcile worker
    pub enable_reconciler: bool,

    /// Reconcile worker options
    pub reconciler: reconciler::Options,

    /// Status reads older than this are refreshed first
    pub stale_after: Option<Duration>,

    /// Wait loop bounds for slow resources
    pub waits: WaitOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout: StorageLayout::default(),
            templates_dir: None,
            cloud_backend: CloudBackendKind::default(),
            aws_profile: None,
            default_region: "us-east-1".to_string(),
            enable_server: true,
            server: ServerOptions::default(),
            enable_reconciler: true,
            reconciler: reconciler::Options::default(),
            stale_after: Some(Duration::from_secs(15)),
            waits: WaitOptions::default(),
        }
    }
}

impl AppOptions {
    /// Options described by a settings file
    pub fn from_settings(settings: &Settings) -> Self {
        let layout = match &settings.storage_dir {
            Some(dir) => StorageLayout::new(dir),
            None => StorageLayout::default(),
        };
        let stale_after = (settings.reconcile.stale_after_secs > 0)
            .then(|| Duration::from_secs(settings.reconcile.stale_after_secs));

        Self {
            layout,
            templates_dir: settings.templates_dir.as_ref().map(PathBuf::from),
            cloud_backend: settings.cloud_backend,
            aws_profile: settings.aws_profile.clone(),
            default_region: settings.default_region.clone(),
            server: ServerOptions {
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            enable_reconciler: settings.reconcile.enabled,
            reconciler: reconciler::Options {
                interval: Duration::from_secs(settings.reconcile.interval_secs.max(1)),
                ..Default::default()
            },
            stale_after,
            waits: WaitOptions::from_settings(&settings.waits),
            ..Default::default()
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Query API server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
