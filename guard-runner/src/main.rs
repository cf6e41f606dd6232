//! Image Guard
//!
//! Keeps running containers on the newest image their registry mirrors offer.
//!
//! Architecture:
//! - Configuration: command line flags, each with an environment fallback
//! - Context: runtime and registry clients, built once and shared by every run
//! - Services: candidate evaluation, container updates, the run pipeline
//! - Scheduler: cron trigger with an overlap guard
//!
//! Each run inspects the watched containers, asks every configured registry
//! mirror for the image they run, and recreates the containers for which a
//! mirror offers a newer build.

mod config;
mod context;
mod error;
mod scheduler;
mod service;

use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use guard_client::{CredentialStore, DockerRuntime, OciRegistryClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, DEFAULT_SCHEDULE};
use crate::context::GuardContext;
use crate::scheduler::RunTrigger;
use crate::service::{MirrorEvaluator, Pipeline, PipelineDriver, UpdateService};

#[derive(Parser)]
#[command(name = "image-guard")]
#[command(about = "Watch container images and recreate containers when a newer image is available", long_about = None)]
struct Cli {
    /// Containers to watch (comma separated); all running containers when empty
    #[arg(short, long, env = "GUARD_CONTAINERS", value_delimiter = ',')]
    containers: Vec<String>,

    /// Cron expression for checks, five fields or six with seconds
    #[arg(short, long, env = "GUARD_SCHEDULE", default_value = DEFAULT_SCHEDULE)]
    schedule: String,

    /// Maximum number of containers updated at the same time
    #[arg(long, env = "GUARD_MAX_PARALLEL_UPDATES")]
    max_parallel_updates: Option<usize>,

    /// Seconds a single registry lookup may take
    #[arg(long, env = "GUARD_REGISTRY_TIMEOUT", default_value_t = 30)]
    registry_timeout: u64,

    /// Accept self-signed certificates from HTTPS mirrors
    #[arg(long, env = "GUARD_REGISTRY_INSECURE_SKIP_VERIFY")]
    registry_insecure_skip_verify: bool,

    /// Docker CLI config directory used for registry credentials
    #[arg(long, env = "DOCKER_CONFIG")]
    docker_config: Option<PathBuf>,

    /// Report outdated containers without updating them
    #[arg(long, env = "GUARD_DRY_RUN")]
    dry_run: bool,

    /// Run a single check and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guard_runner=info,guard_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let once = cli.once;

    info!("Starting Image Guard");

    let config = load_config(cli)?;
    info!(
        "Loaded configuration: schedule={}, dry_run={}, max_parallel_updates={:?}",
        config.schedule, config.dry_run, config.max_parallel_updates
    );

    // Clients live for the whole process and are reused by every run
    let runtime = DockerRuntime::connect().context("Failed to connect to Docker")?;
    let registry = OciRegistryClient::new(
        config.registry,
        CredentialStore::new(config.docker_config.clone()),
    );
    let context = GuardContext::new(
        Arc::new(runtime),
        Arc::new(registry),
        config.containers.clone(),
    );

    info!("Clients initialized");

    let evaluator = Arc::new(MirrorEvaluator::new(
        Arc::clone(context.registry()),
        config.fetch_timeout,
    ));
    let updater = UpdateService::new(Arc::clone(context.runtime()), config.max_parallel_updates);
    let pipeline: Arc<dyn Pipeline> = Arc::new(
        PipelineDriver::new(context, evaluator, updater).with_dry_run(config.dry_run),
    );

    let trigger = RunTrigger::new(&config.schedule, pipeline)?;

    if once {
        trigger.run_once().await.context("Run failed")?;
        return Ok(());
    }

    trigger.run().await
}

/// Builds and validates the configuration from command line and environment
fn load_config(cli: Cli) -> Result<Config> {
    let config = Config::new(cli.containers)
        .with_schedule(cli.schedule)
        .with_max_parallel_updates(cli.max_parallel_updates)
        .with_fetch_timeout(Duration::from_secs(cli.registry_timeout))
        .with_insecure_registries(cli.registry_insecure_skip_verify)
        .with_docker_config(cli.docker_config)
        .with_dry_run(cli.dry_run);

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
