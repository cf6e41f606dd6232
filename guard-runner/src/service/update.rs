//! Update orchestration
//!
//! Applies update decisions: pull the chosen candidate, then replace the
//! container with one running the new image. Every decision runs in its own
//! task; a failing task never affects the others.

use guard_client::{ContainerRuntime, ContainerSpec};
use guard_core::UpdateDecision;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::error::GuardError;

/// Result of one update task
#[derive(Debug)]
pub struct UpdateOutcome {
    pub container: String,
    pub result: Result<String, GuardError>,
}

/// Pulls images and recreates containers
#[derive(Clone)]
pub struct UpdateService {
    runtime: Arc<dyn ContainerRuntime>,

    /// Cap on concurrent updates; `None` allows one per pending decision
    max_parallel: Option<usize>,
}

impl UpdateService {
    /// Creates a new update service
    ///
    /// # Arguments
    /// * `runtime` - Container runtime client
    /// * `max_parallel` - Optional cap on simultaneous updates
    pub fn new(runtime: Arc<dyn ContainerRuntime>, max_parallel: Option<usize>) -> Self {
        Self {
            runtime,
            max_parallel,
        }
    }

    /// Applies every decision concurrently and waits for all of them
    ///
    /// # Returns
    /// One outcome per decision, in decision order
    pub async fn apply_all(&self, decisions: Vec<UpdateDecision>) -> Vec<UpdateOutcome> {
        if decisions.is_empty() {
            return Vec::new();
        }

        let permits = self.max_parallel.unwrap_or(decisions.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));

        let mut handles = Vec::with_capacity(decisions.len());
        for decision in decisions {
            let service = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let container = decision.container.clone();

            let handle = tokio::spawn(async move {
                // Held until the update finishes; the semaphore is never closed
                let _permit = semaphore.acquire_owned().await;
                service.apply(&decision).await
            });
            handles.push((container, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (container, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(GuardError::TaskAborted {
                    container: container.clone(),
                    message: e.to_string(),
                }),
            };

            match &result {
                Ok(image) => info!(container = %container, image = %image, "Container updated"),
                Err(e) => error!(container = %container, kind = e.kind(), "Update failed: {}", e),
            }

            outcomes.push(UpdateOutcome { container, result });
        }

        outcomes
    }

    /// Pulls the decision's target and recreates the container on it
    ///
    /// # Returns
    /// The image name the new container runs
    pub async fn apply(&self, decision: &UpdateDecision) -> Result<String, GuardError> {
        let name = &decision.container;
        let target = decision.pull_target();
        let image = target.image();

        info!(
            container = %name,
            reference = %decision.target.repository,
            "Updating container"
        );

        self.runtime
            .pull_image(&target)
            .await
            .map_err(|source| GuardError::Pull {
                container: name.clone(),
                image: target.source.clone(),
                source,
            })?;

        info!(
            container = %name,
            image = %image,
            created = %decision.target.created.format("%Y-%m-%d %H:%M:%S"),
            "Image pulled, recreating container"
        );

        self.recreate(name, &image).await?;
        Ok(image)
    }

    /// Replaces a container with one running `image`
    ///
    /// Inspect, remove, create, start. When start fails because the
    /// configured user has no passwd entry in the new image, the fresh
    /// container is removed and created again without a user override.
    async fn recreate(&self, name: &str, image: &str) -> Result<(), GuardError> {
        let snapshot = self
            .runtime
            .inspect_container(name)
            .await
            .map_err(|source| GuardError::Inspect {
                container: name.to_string(),
                source,
            })?;

        self.runtime
            .remove_container(name)
            .await
            .map_err(|source| GuardError::Remove {
                container: name.to_string(),
                source,
            })?;

        let mut spec = ContainerSpec::replacing(&snapshot, image);

        loop {
            let id = self
                .runtime
                .create_container(name, &spec)
                .await
                .map_err(|source| GuardError::Create {
                    container: name.to_string(),
                    source,
                })?;

            let source = match self.runtime.start_container(&id).await {
                Ok(()) => return Ok(()),
                Err(source) => source,
            };

            if !source.is_missing_passwd_entry() {
                return Err(GuardError::Start {
                    container: name.to_string(),
                    source,
                });
            }

            // Clearing an already empty user cannot change the outcome
            let Some(user) = spec.user.take() else {
                return Err(GuardError::PasswdEntry {
                    container: name.to_string(),
                    source,
                });
            };

            warn!(
                container = %name,
                user = %user,
                "User missing from image passwd database, retrying without user"
            );

            self.runtime
                .remove_container(name)
                .await
                .map_err(|source| GuardError::Remove {
                    container: name.to_string(),
                    source,
                })?;
        }
    }
}
