//! Pipeline driver
//!
//! One run: discover watched containers, read their running images, gather
//! candidates from the registry mirrors, pick update targets and apply them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guard_client::{ClientError, reference};
use guard_core::{ContainerInfo, Freshness, ImageInfo, UpdateDecision};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::context::GuardContext;
use crate::error::GuardError;
use crate::service::evaluation::FreshnessEvaluator;
use crate::service::update::UpdateService;

/// Service trait for a full pipeline run
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Executes one run; safe to call repeatedly
    async fn run(&self) -> Result<RunReport, GuardError>;
}

/// Summary of one run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,

    /// Containers on the watch list
    pub watched: usize,

    /// Containers dropped before evaluation
    pub skipped: Vec<GuardError>,

    /// Containers for which no mirror produced a candidate
    pub evaluation_failures: Vec<GuardError>,

    /// Containers with nothing to update
    pub current: Vec<String>,

    /// Update targets chosen this run
    pub decisions: Vec<UpdateDecision>,

    /// Containers recreated on a new image
    pub updated: Vec<String>,

    pub update_failures: Vec<GuardError>,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            watched: 0,
            skipped: Vec::new(),
            evaluation_failures: Vec::new(),
            current: Vec::new(),
            decisions: Vec::new(),
            updated: Vec::new(),
            update_failures: Vec::new(),
        }
    }

    /// Number of failures of any kind
    pub fn failures(&self) -> usize {
        self.skipped.len() + self.evaluation_failures.len() + self.update_failures.len()
    }

    /// Logs a one-line summary
    pub fn log_summary(&self) {
        info!(
            run_id = %self.run_id,
            watched = self.watched,
            current = self.current.len(),
            outdated = self.decisions.len(),
            updated = self.updated.len(),
            failures = self.failures(),
            elapsed_ms = (Utc::now() - self.started_at).num_milliseconds(),
            "Run complete"
        );
    }
}

/// Standard pipeline implementation
pub struct PipelineDriver {
    context: Arc<GuardContext>,
    evaluator: Arc<dyn FreshnessEvaluator>,
    updater: UpdateService,

    /// Evaluate and report only
    dry_run: bool,
}

impl PipelineDriver {
    pub fn new(
        context: Arc<GuardContext>,
        evaluator: Arc<dyn FreshnessEvaluator>,
        updater: UpdateService,
    ) -> Self {
        Self {
            context,
            evaluator,
            updater,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Reads the image a container currently runs
    async fn current_container(&self, name: &str) -> Result<ContainerInfo, GuardError> {
        let discovery = |source: ClientError| GuardError::Discovery {
            container: name.to_string(),
            source,
        };
        let runtime = self.context.runtime();

        let snapshot = runtime.inspect_container(name).await.map_err(discovery)?;
        let image = runtime
            .inspect_image(&snapshot.image_id)
            .await
            .map_err(discovery)?;

        let repo_tag = running_repo_tag(snapshot.config.image.as_deref(), &image.repo_tags)
            .ok_or_else(|| discovery(ClientError::MissingField(format!("{}: repo tag", image.id))))?;
        let parsed = reference::parse(repo_tag).map_err(discovery)?;

        Ok(ContainerInfo::new(
            snapshot.name,
            ImageInfo::new(image.created, repo_tag.clone(), parsed, snapshot.image_id),
        ))
    }

    async fn execute(&self, mut report: RunReport) -> Result<RunReport, GuardError> {
        let watch_list = self
            .context
            .watch_list()
            .await
            .map_err(|source| GuardError::ListContainers { source })?;
        report.watched = watch_list.len();

        let mut containers = Vec::new();
        for name in &watch_list {
            match self.current_container(name).await {
                Ok(info) => containers.push(info),
                Err(e) => {
                    warn!(container = %name, "Skipping container: {}", e);
                    report.skipped.push(e);
                }
            }
        }

        if containers.is_empty() {
            return Err(GuardError::NoContainers);
        }

        let mirrors = self
            .context
            .runtime()
            .registry_mirrors()
            .await
            .map_err(|source| GuardError::Mirrors { source })?;
        for mirror in &mirrors {
            info!(mirror = %mirror, "Registry mirror");
        }

        for container in containers {
            let container = container.with_mirrors(mirrors.clone());
            let evaluated = match self.evaluator.evaluate(container).await {
                Ok(evaluated) => evaluated,
                Err(e) => {
                    error!(kind = e.kind(), "{}", e);
                    report.evaluation_failures.push(e);
                    continue;
                }
            };

            match evaluated.freshness() {
                Freshness::Outdated(candidate) => {
                    info!(
                        container = %evaluated.name,
                        reference = %candidate.repository,
                        created = %candidate.created,
                        "Newer image available"
                    );
                    report
                        .decisions
                        .push(UpdateDecision::new(evaluated.name.clone(), candidate.clone()));
                }
                Freshness::UpToDate(_) | Freshness::NoNewerCandidate => {
                    info!(container = %evaluated.name, "No need to update the image");
                    report.current.push(evaluated.name.clone());
                }
            }
        }

        if self.dry_run {
            for decision in &report.decisions {
                info!(
                    container = %decision.container,
                    image = %decision.pull_target().image(),
                    "Dry run, not updating"
                );
            }
            return Ok(report);
        }

        for outcome in self.updater.apply_all(report.decisions.clone()).await {
            match outcome.result {
                Ok(_) => report.updated.push(outcome.container),
                Err(e) => report.update_failures.push(e),
            }
        }

        Ok(report)
    }
}

/// Picks the repo tag a container runs under
///
/// An image pulled through a mirror is listed under both the mirror name and
/// the local name, in no useful order. The name in the container's config
/// wins, then the first name on the default registry.
fn running_repo_tag<'a>(configured: Option<&str>, repo_tags: &'a [String]) -> Option<&'a String> {
    repo_tags
        .iter()
        .find(|tag| configured == Some(tag.as_str()))
        .or_else(|| {
            repo_tags.iter().find(|tag| {
                reference::parse(tag).is_ok_and(|parsed| parsed.is_default_registry())
            })
        })
        .or_else(|| repo_tags.first())
}

#[async_trait]
impl Pipeline for PipelineDriver {
    async fn run(&self) -> Result<RunReport, GuardError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);

        async {
            info!("Starting run");
            let report = self.execute(RunReport::new(run_id)).await?;
            report.log_summary();
            Ok::<_, GuardError>(report)
        }
        .instrument(span)
        .await
    }
}
