//! Launchpad - Entry Point
//!
//! Deploys serverless web applications and keeps their recorded status in
//! line with the cloud control plane.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use launchpad_models::{DeploymentRecord, DeploymentRequest, DeploymentStatus};
use tracing::{error, info};

use launchpad::app::options::AppOptions;
use launchpad::app::run::run;
use launchpad::app::state::AppState;
use launchpad::filesys::file::File;
use launchpad::logs::{init_logging, LogLevel, LogOptions};
use launchpad::query::DeploymentLookup;
use launchpad::storage::layout::StorageLayout;
use launchpad::storage::settings::{CloudBackendKind, Settings};
use launchpad::utils::version_info;

/// Serverless web application deployer
#[derive(Parser)]
#[command(name = "launchpad")]
#[command(about = "Deploy serverless web applications and track their status")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file, defaults to ~/.launchpad/settings.json
    #[arg(long, env = "LAUNCHPAD_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the configured cloud backend (aws or simulated)
    #[arg(long, global = true)]
    cloud: Option<CloudBackendKind>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the query API and the background reconciler
    Serve,

    /// Deploy from a request file (JSON or YAML) and follow its progress
    Deploy {
        /// Path to the deployment request
        file: PathBuf,

        /// Return once the deployment is accepted
        #[arg(long)]
        no_follow: bool,
    },

    /// Show the status of one deployment
    Status {
        /// Project name
        project: String,

        /// Reconcile against the control plane first
        #[arg(long)]
        refresh: bool,
    },

    /// List every known deployment
    List,

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = dispatch(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    if let Commands::Version = cli.command {
        let version = version_info();
        println!("{}", serde_json::to_string_pretty(&version)?);
        return Ok(());
    }

    let mut settings = load_settings(cli.config.as_deref()).await?;
    if let Some(cloud) = cli.cloud {
        settings.cloud_backend = cloud;
    }

    // Initialize logging
    let serving = matches!(cli.command, Commands::Serve);
    let log_options = LogOptions {
        level: if cli.verbose {
            LogLevel::Debug
        } else if serving {
            settings.log_level
        } else {
            LogLevel::Warn
        },
        json: settings.log_json,
        file_dir: settings.log_dir.as_ref().map(PathBuf::from),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings);
    match cli.command {
        Commands::Serve => {
            info!("Running launchpad with options: {:?}", options);
            run(options, await_shutdown_signal())
                .await
                .context("launchpad service failed")
        }
        Commands::Deploy { file, no_follow } => deploy(&options, &file, no_follow).await,
        Commands::Status { project, refresh } => status(&options, &project, refresh).await,
        Commands::List => list(&options).await,
        Commands::Version => Ok(()),
    }
}

async fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let file = match path {
        Some(path) => File::new(path),
        None => StorageLayout::default().settings_file(),
    };
    let settings = file
        .read_json_opt::<Settings>()
        .await
        .with_context(|| format!("unable to read settings file {}", file.path().display()))?;
    match (settings, path) {
        (Some(settings), _) => Ok(settings),
        (None, Some(path)) => bail!("settings file {} does not exist", path.display()),
        (None, None) => Ok(Settings::default()),
    }
}

async fn read_request(path: &Path) -> Result<DeploymentRequest> {
    let contents = File::new(path)
        .read_string()
        .await
        .with_context(|| format!("unable to read {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let request = if is_yaml {
        serde_yaml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };
    Ok(request)
}

// ================================= COMMANDS ===================================== //

async fn deploy(options: &AppOptions, path: &Path, no_follow: bool) -> Result<()> {
    let request = read_request(path).await?;
    let state = AppState::init(options).await?;

    let record = state.orchestrator.orchestrate(request).await?;
    println!(
        "{} {} ({})",
        "Accepted".cyan().bold(),
        record.project_name,
        record.attempt_id.as_deref().unwrap_or("-")
    );
    if no_follow {
        return Ok(());
    }

    let mut printed = record.progress_log.len();
    let record = loop {
        tokio::time::sleep(Duration::from_millis(500)).await;
        let Some(current) = state
            .orchestrator
            .current_status(&record.project_name)
            .await?
            .into_record()
        else {
            bail!("deployment record of {} disappeared", record.project_name);
        };
        for entry in current.progress_log.iter().skip(printed) {
            println!("  {} {}", entry.timestamp.format("%H:%M:%S").to_string().dimmed(), entry.message);
        }
        printed = current.progress_log.len();
        if !state.active.contains(&current.project_name) && current.status.is_terminal() {
            break current;
        }
    };

    print_record(&record);
    if record.status == DeploymentStatus::Failed {
        error!("Deployment of {} failed", record.project_name);
        std::process::exit(2);
    }
    Ok(())
}

async fn status(options: &AppOptions, project: &str, refresh: bool) -> Result<()> {
    let state = AppState::init(options).await?;
    let lookup = if refresh {
        DeploymentLookup::Found(state.query.refresh(project).await?)
    } else {
        state.query.get_deployment_status(project).await?
    };
    match lookup {
        DeploymentLookup::Found(record) => print_record(&record),
        DeploymentLookup::NotFound(project) => {
            println!("{} {}", project.bold(), colored_status(DeploymentStatus::NotFound));
        }
    }
    Ok(())
}

async fn list(options: &AppOptions) -> Result<()> {
    let state = AppState::init(options).await?;
    let records = state.query.list_deployments().await?;
    if records.is_empty() {
        println!("No deployments");
        return Ok(());
    }
    for record in records {
        println!(
            "{:<32} {:<12} {:<12} {}",
            record.project_name,
            colored_status(record.status),
            record.region,
            record.last_updated.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

// ================================= OUTPUT ======================================= //

fn colored_status(status: DeploymentStatus) -> colored::ColoredString {
    let label = status.as_str();
    match status {
        DeploymentStatus::Completed => label.green(),
        DeploymentStatus::Partial => label.yellow(),
        DeploymentStatus::InProgress => label.cyan(),
        DeploymentStatus::Failed => label.red(),
        _ => label.dimmed(),
    }
}

fn print_record(record: &DeploymentRecord) {
    println!("{} {}", record.project_name.bold(), colored_status(record.status));
    println!("  stack:  {} ({})", record.stack_name, record.region);
    if let Some(stack_id) = &record.stack_id {
        println!("  id:     {}", stack_id);
    }
    if !record.outputs.is_empty() {
        println!("  outputs:");
        for (key, value) in &record.outputs {
            println!("    {:<28} {}", key, value);
        }
    }
    if !record.resources.is_empty() {
        println!("  resources:");
        for resource in &record.resources {
            println!(
                "    {:<28} {:<40} {}",
                resource.logical_id, resource.resource_type, resource.status
            );
        }
    }
    if let Some(err) = &record.error {
        println!("  {} [{}] {}", "error:".red(), err.kind, err.message);
        for step in &err.failed_steps {
            println!("    failed step: {}", step);
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigterm), Ok(mut sigint)) =
            (signal(SignalKind::terminate()), signal(SignalKind::interrupt()))
        else {
            error!("Unable to install signal handlers, waiting for Ctrl+C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
