//! Watched container model
//!
//! Pairs a container's running image with the candidates found on the
//! configured mirrors, and decides whether the container should move.

use serde::{Deserialize, Serialize};

use super::image::ImageInfo;

/// One watched container for the duration of a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Container name, without the leading slash the runtime reports
    pub name: String,

    /// Image the container is running right now
    pub current_image: ImageInfo,

    /// Remote candidates, in the order their mirrors were queried
    pub candidate_images: Vec<ImageInfo>,

    /// Mirror endpoints in configuration (priority) order
    pub mirrors: Vec<String>,
}

/// Outcome of scanning the candidates of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness<'a> {
    /// A candidate has the same content identifier as the running image
    UpToDate(&'a ImageInfo),

    /// A candidate was built after the running image
    Outdated(&'a ImageInfo),

    /// Nothing identical and nothing newer
    NoNewerCandidate,
}

impl ContainerInfo {
    /// Creates a container with no mirrors and no candidates yet
    pub fn new(name: impl Into<String>, current_image: ImageInfo) -> Self {
        Self {
            name: name.into(),
            current_image,
            candidate_images: Vec::new(),
            mirrors: Vec::new(),
        }
    }

    /// Sets the mirror list
    pub fn with_mirrors(mut self, mirrors: Vec<String>) -> Self {
        self.mirrors = mirrors;
        self
    }

    /// Scans candidates in mirror order and stops at the first decisive one
    ///
    /// An identical content identifier means the container is current and
    /// ends the scan. Otherwise the first candidate built strictly after the
    /// running image is chosen, even if a later mirror offers a newer build.
    pub fn freshness(&self) -> Freshness<'_> {
        for candidate in &self.candidate_images {
            if candidate.is_same_content(&self.current_image) {
                return Freshness::UpToDate(candidate);
            }
            if candidate.is_newer_than(&self.current_image) {
                return Freshness::Outdated(candidate);
            }
        }
        Freshness::NoNewerCandidate
    }

    /// The candidate to update to, if any
    pub fn select_update(&self) -> Option<&ImageInfo> {
        match self.freshness() {
            Freshness::Outdated(candidate) => Some(candidate),
            Freshness::UpToDate(_) | Freshness::NoNewerCandidate => None,
        }
    }
}
