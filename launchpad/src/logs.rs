//! tracing setup for the CLI and the server

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::errors::DeployError;

/// Verbosity accepted in settings and on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

const LEVEL_NAMES: [(LogLevel, &str); 5] = [
    (LogLevel::Trace, "trace"),
    (LogLevel::Debug, "debug"),
    (LogLevel::Info, "info"),
    (LogLevel::Warn, "warn"),
    (LogLevel::Error, "error"),
];

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        LEVEL_NAMES
            .iter()
            .find(|(level, _)| *level == self)
            .map(|(_, name)| *name)
            .unwrap_or("info")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogLevel> for &'static str {
    fn from(level: LogLevel) -> Self {
        level.as_str()
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let name = if lower == "warning" { "warn" } else { lower.as_str() };
        LEVEL_NAMES
            .iter()
            .find(|(_, candidate)| *candidate == name)
            .map(|(level, _)| *level)
            .ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// Where and how events are written
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: LogLevel,
    /// Human-readable (or JSON) events on stdout
    pub stdout: bool,
    pub json: bool,
    /// Daily rolling JSON files, always machine-readable
    pub file_dir: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            stdout: true,
            json: false,
            file_dir: None,
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
///
/// Hold the returned guard until exit so buffered file events are flushed.
pub fn init_logging(options: LogOptions) -> Result<Option<WorkerGuard>, DeployError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(options.level.as_str()));

    let stdout_layer = options.stdout.then(|| {
        let layer = tracing_subscriber::fmt::layer().with_target(false);
        if options.json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    });

    let mut guard = None;
    let file_layer = options.file_dir.as_ref().map(|dir| {
        let (writer, flush_guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "launchpad.log"));
        guard = Some(flush_guard);
        tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| DeployError::ConfigError(format!("logging already initialised: {}", e)))?;

    Ok(guard)
}
