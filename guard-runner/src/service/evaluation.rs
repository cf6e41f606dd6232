//! Freshness evaluation
//!
//! Collects candidate images for a container from every configured mirror.
//! Deciding which candidate wins is left to `ContainerInfo::freshness`.

use async_trait::async_trait;
use futures::future::join_all;
use guard_client::{ClientError, RegistryClient, reference};
use guard_core::{ContainerInfo, ImageInfo, ImageReference};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ErrorList, GuardError};

/// Service trait for gathering remote candidates
#[async_trait]
pub trait FreshnessEvaluator: Send + Sync {
    /// Fills `candidate_images` of a container
    ///
    /// Succeeds as long as at least one mirror produced a candidate.
    /// Failures of individual mirrors are logged and dropped.
    ///
    /// # Returns
    /// The container with candidates in mirror order, or an
    /// `Evaluation` error listing every mirror failure.
    async fn evaluate(&self, container: ContainerInfo) -> Result<ContainerInfo, GuardError>;
}

/// Evaluator that asks each registry mirror in turn
pub struct MirrorEvaluator {
    registry: Arc<dyn RegistryClient>,

    /// Upper bound on a single registry lookup
    fetch_timeout: Duration,
}

impl MirrorEvaluator {
    pub fn new(registry: Arc<dyn RegistryClient>, fetch_timeout: Duration) -> Self {
        Self {
            registry,
            fetch_timeout,
        }
    }

    /// Fetches one candidate, giving up once the deadline passes
    async fn fetch(&self, reference: &ImageReference) -> Result<ImageInfo, ClientError> {
        match tokio::time::timeout(self.fetch_timeout, self.registry.fetch(reference)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout {
                reference: reference.to_string(),
                after: self.fetch_timeout,
            }),
        }
    }

    /// Resolves the container's image against every mirror, dropping duplicates
    fn resolve_all(&self, container: &ContainerInfo, errors: &mut ErrorList) -> Vec<ImageReference> {
        let repository = &container.current_image.repository;

        // No mirrors configured: look the image up where it lives
        let mirrors: Vec<&str> = if container.mirrors.is_empty() {
            vec![""]
        } else {
            container
                .mirrors
                .iter()
                .map(|m| m.trim_end_matches('/'))
                .collect()
        };

        // Keyed on the reference name: the transport does not make it a different image
        let mut seen = HashSet::new();
        let mut references = Vec::new();

        for mirror in mirrors {
            info!(container = %container.name, mirror = %mirror, "Inspecting registry mirror");

            match reference::resolve(mirror, repository) {
                Ok(resolved) => {
                    if seen.insert(resolved.to_string()) {
                        references.push(resolved);
                    } else {
                        debug!(container = %container.name, reference = %resolved, "Duplicate reference skipped");
                    }
                }
                Err(source) => errors.push(GuardError::ReferenceParse {
                    mirror: mirror.to_string(),
                    repository: repository.clone(),
                    source,
                }),
            }
        }

        references
    }
}

#[async_trait]
impl FreshnessEvaluator for MirrorEvaluator {
    async fn evaluate(&self, mut container: ContainerInfo) -> Result<ContainerInfo, GuardError> {
        let mut errors = ErrorList::new();
        let references = self.resolve_all(&container, &mut errors);

        // Fetches are independent; join_all keeps results in mirror order
        let results = join_all(references.iter().map(|r| self.fetch(r))).await;

        for (resolved, result) in references.iter().zip(results) {
            match result {
                Ok(image) => {
                    info!(
                        container = %container.name,
                        reference = %resolved,
                        created = %image.created,
                        "Found candidate image"
                    );
                    container.candidate_images.push(image);
                }
                Err(source) => errors.push(GuardError::remote(resolved, source)),
            }
        }

        if container.candidate_images.is_empty() {
            return Err(GuardError::Evaluation {
                container: container.name,
                errors,
            });
        }

        debug!(
            container = %container.name,
            candidates = container.candidate_images.len(),
            failed = errors.len(),
            "Candidates gathered"
        );

        for error in errors.iter() {
            warn!(container = %container.name, kind = error.kind(), "Mirror skipped: {}", error);
        }

        Ok(container)
    }
}
