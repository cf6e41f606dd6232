//! Run trigger
//!
//! Fires the pipeline on a cron schedule. Each run executes in its own task;
//! a firing that arrives while a run is still in flight is skipped.

use anyhow::Result;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};

use crate::error::GuardError;
use crate::service::{Pipeline, RunReport};

/// Parses a cron expression
///
/// Accepts the classic five-field form ("*/1 * * * *") as well as the
/// six and seven-field forms with seconds and year. Five-field expressions
/// fire at second zero.
pub fn parse_schedule(expression: &str) -> Result<Schedule> {
    let expression = expression.trim();
    let normalized = if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    };

    Schedule::from_str(&normalized)
        .map_err(|e| anyhow::anyhow!("Invalid cron schedule '{}': {}", expression, e))
}

/// Time left until the schedule next fires after `now`
fn delay_until_next(schedule: &Schedule, now: DateTime<Utc>) -> Option<Duration> {
    schedule
        .after(&now)
        .next()
        .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
}

/// Cron trigger with a non-blocking run guard
pub struct RunTrigger {
    expression: String,
    schedule: Schedule,
    pipeline: Arc<dyn Pipeline>,

    /// Single permit, held by the run in flight
    in_flight: Arc<Semaphore>,
}

impl RunTrigger {
    /// Creates a new trigger
    ///
    /// # Arguments
    /// * `expression` - Cron expression deciding when runs fire
    /// * `pipeline` - Pipeline executed on every firing
    pub fn new(expression: &str, pipeline: Arc<dyn Pipeline>) -> Result<Self> {
        Ok(Self {
            expression: expression.trim().to_string(),
            schedule: parse_schedule(expression)?,
            pipeline,
            in_flight: Arc::new(Semaphore::new(1)),
        })
    }

    /// Fires runs until Ctrl-C, then waits for the run in flight
    pub async fn run(&self) -> Result<()> {
        info!("Starting run trigger (schedule: {})", self.expression);

        let shutdown = signal::ctrl_c();
        tokio::pin!(shutdown);

        let mut last_run: Option<JoinHandle<()>> = None;

        loop {
            let Some(delay) = delay_until_next(&self.schedule, Utc::now()) else {
                warn!("Schedule has no upcoming firing, stopping");
                break;
            };
            debug!("Next run in {:?}", delay);

            tokio::select! {
                _ = time::sleep(delay) => {
                    if let Some(handle) = self.fire() {
                        last_run = Some(handle);
                    }
                }
                result = &mut shutdown => {
                    if let Err(e) = result {
                        warn!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        if let Some(handle) = last_run {
            if !handle.is_finished() {
                info!("Waiting for the run in flight to finish");
            }
            if let Err(e) = handle.await {
                warn!("Run task panicked: {}", e);
            }
        }

        Ok(())
    }

    /// Starts a run in the background unless one is already in flight
    ///
    /// # Returns
    /// The handle of the started run, or `None` if the trigger was skipped
    pub fn fire(&self) -> Option<JoinHandle<()>> {
        let permit = match Arc::clone(&self.in_flight).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Previous run still in progress, skipping this trigger");
                return None;
            }
        };

        let pipeline = Arc::clone(&self.pipeline);
        Some(tokio::spawn(async move {
            if let Err(e) = pipeline.run().await {
                error!(kind = e.kind(), "Run failed: {}", e);
            }
            drop(permit);
        }))
    }

    /// Performs a single run in the foreground
    pub async fn run_once(&self) -> Result<RunReport, GuardError> {
        let _permit = Arc::clone(&self.in_flight).acquire_owned().await;
        self.pipeline.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[test]
    fn test_parse_schedule_forms() {
        assert!(parse_schedule("*/1 * * * *").is_ok());
        assert!(parse_schedule("0 3 * * *").is_ok());
        assert!(parse_schedule("30 0 3 * * * *").is_ok());
        assert!(parse_schedule("every minute").is_err());
        assert!(parse_schedule("").is_err());
    }

    #[test]
    fn test_delay_until_next_firing() {
        let schedule = parse_schedule("0 3 * * *").unwrap();

        let before = Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap();
        assert_eq!(
            delay_until_next(&schedule, before),
            Some(Duration::from_secs(3600))
        );

        // A firing time itself schedules the next day
        let at_firing = Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap();
        assert_eq!(
            delay_until_next(&schedule, at_firing),
            Some(Duration::from_secs(24 * 3600))
        );

        let every_minute = parse_schedule("*/1 * * * *").unwrap();
        let mid_minute = Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 15).unwrap();
        assert_eq!(
            delay_until_next(&every_minute, mid_minute),
            Some(Duration::from_secs(45))
        );
    }

    #[test]
    fn test_invalid_expression_is_rejected() {
        let pipeline = Arc::new(GatedPipeline::default());
        assert!(RunTrigger::new("61 * * * *", pipeline).is_err());
    }

    /// Pipeline that blocks until released and counts its runs
    #[derive(Default)]
    struct GatedPipeline {
        release: Notify,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Pipeline for GatedPipeline {
        async fn run(&self) -> Result<RunReport, GuardError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Err(GuardError::NoContainers)
        }
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let pipeline = Arc::new(GatedPipeline::default());
        let trigger = RunTrigger::new("* * * * *", pipeline.clone()).unwrap();

        let first = trigger.fire().expect("first run should start");
        assert!(trigger.fire().is_none());

        pipeline.release.notify_one();
        first.await.unwrap();

        let second = trigger.fire().expect("run should start once the first finished");
        pipeline.release.notify_one();
        second.await.unwrap();

        assert_eq!(pipeline.runs.load(Ordering::SeqCst), 2);
    }
}
