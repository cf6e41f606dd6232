//! Guard configuration
//!
//! Defines the configurable parameters of the guard: what to watch, when to
//! check, and how registry lookups behave.

use guard_client::RegistrySettings;
use std::path::PathBuf;
use std::time::Duration;

use crate::scheduler::parse_schedule;

/// Every minute
pub const DEFAULT_SCHEDULE: &str = "*/1 * * * *";

/// Guard configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Containers to watch; empty means every running container
    pub containers: Vec<String>,

    /// Cron expression deciding when runs fire
    pub schedule: String,

    /// Cap on simultaneous container updates (default: one per pending update)
    pub max_parallel_updates: Option<usize>,

    /// Deadline for a single registry lookup
    pub fetch_timeout: Duration,

    /// Registry transport settings
    pub registry: RegistrySettings,

    /// Directory holding the Docker CLI `config.json` used for registry credentials
    pub docker_config: Option<PathBuf>,

    /// Evaluate and report, but never pull or recreate
    pub dry_run: bool,
}

impl Config {
    /// Creates a configuration with defaults for everything but the watch list
    pub fn new(containers: Vec<String>) -> Self {
        Self {
            containers: normalize_names(containers),
            schedule: DEFAULT_SCHEDULE.to_string(),
            max_parallel_updates: None,
            fetch_timeout: Duration::from_secs(30),
            registry: RegistrySettings::default(),
            docker_config: None,
            dry_run: false,
        }
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = schedule.into();
        self
    }

    pub fn with_max_parallel_updates(mut self, max: Option<usize>) -> Self {
        self.max_parallel_updates = max;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_insecure_registries(mut self, accept_invalid_certificates: bool) -> Self {
        self.registry.accept_invalid_certificates = accept_invalid_certificates;
        self
    }

    pub fn with_docker_config(mut self, dir: Option<PathBuf>) -> Self {
        self.docker_config = dir;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        parse_schedule(&self.schedule)?;

        if self.fetch_timeout.is_zero() {
            anyhow::bail!("registry fetch timeout must be greater than 0");
        }

        if self.max_parallel_updates == Some(0) {
            anyhow::bail!("max_parallel_updates must be greater than 0 when set");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Trims names, drops the runtime's leading slash and empty entries
fn normalize_names(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .map(|n| n.trim().trim_start_matches('/').to_string())
        .filter(|n| !n.is_empty())
        .collect()
}
