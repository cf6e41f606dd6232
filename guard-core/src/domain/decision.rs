//! Update decisions
//!
//! A decision maps one container to the candidate it should be moved to.

use serde::{Deserialize, Serialize};

use super::image::ImageInfo;

/// A container selected for update and the image it moves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDecision {
    pub container: String,
    pub target: ImageInfo,
}

impl UpdateDecision {
    pub fn new(container: impl Into<String>, target: ImageInfo) -> Self {
        Self {
            container: container.into(),
            target,
        }
    }

    /// Where to pull the target from and what to call it locally
    pub fn pull_target(&self) -> PullTarget {
        PullTarget::for_image(&self.target)
    }
}

/// Local repository and tag applied after a pull
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalTag {
    pub repository: String,
    pub tag: String,
}

/// Coordinates used to pull a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullTarget {
    /// Mirror-resolved reference the runtime pulls from
    pub source: String,

    /// Retag applied after pulling, when the source lives on a mirror
    pub local: Option<LocalTag>,
}

impl PullTarget {
    /// Computes the pull coordinates of a candidate
    ///
    /// Candidates found on a mirror are pulled from the mirror and tagged
    /// back to their repository path and tag, so the recreated container
    /// keeps a default-registry name. Digest-pinned and unmirrored
    /// references are used as they are.
    pub fn for_image(image: &ImageInfo) -> Self {
        let reference = &image.reference;
        let local = match (&reference.tag, &reference.digest) {
            (Some(tag), None) if reference.via_mirror => Some(LocalTag {
                repository: reference.repository.clone(),
                tag: tag.clone(),
            }),
            _ => None,
        };

        Self {
            source: reference.to_string(),
            local,
        }
    }

    /// Image name the recreated container should run
    pub fn image(&self) -> String {
        match &self.local {
            Some(local) => format!("{}:{}", local.repository, local.tag),
            None => self.source.clone(),
        }
    }
}
