//! Pipeline errors
//!
//! One variant per failure kind a run can hit. None of them is fatal to the
//! process: each is logged and the affected candidate, container or update
//! is dropped from the run.

use guard_client::ClientError;
use guard_core::ImageReference;
use std::fmt;
use thiserror::Error;

/// Failures surfaced by a pipeline run
#[derive(Debug, Error)]
pub enum GuardError {
    /// The runtime could not enumerate running containers
    #[error("Failed to list running containers: {source}")]
    ListContainers {
        #[source]
        source: ClientError,
    },

    /// A watched container or its image could not be inspected
    #[error("Failed to discover container '{container}': {source}")]
    Discovery {
        container: String,
        #[source]
        source: ClientError,
    },

    /// The runtime's registry mirror configuration could not be read
    #[error("Failed to read registry mirrors: {source}")]
    Mirrors {
        #[source]
        source: ClientError,
    },

    /// A mirror or repository string could not be turned into a reference
    #[error("Failed to resolve '{repository}' via mirror '{mirror}': {source}")]
    ReferenceParse {
        mirror: String,
        repository: String,
        #[source]
        source: ClientError,
    },

    /// A registry could not be reached, refused access or lacks the image
    #[error("Failed to fetch {reference}: {source}")]
    RemoteFetch {
        reference: String,
        #[source]
        source: ClientError,
    },

    /// A registry answered but the image metadata was unusable
    #[error("Unusable remote image {reference}: {source}")]
    RemoteImage {
        reference: String,
        #[source]
        source: ClientError,
    },

    /// No mirror produced a candidate for a container
    #[error("No candidate image for container '{container}': {errors}")]
    Evaluation { container: String, errors: ErrorList },

    #[error("Failed to pull {image} for container '{container}': {source}")]
    Pull {
        container: String,
        image: String,
        #[source]
        source: ClientError,
    },

    #[error("Failed to inspect container '{container}': {source}")]
    Inspect {
        container: String,
        #[source]
        source: ClientError,
    },

    #[error("Failed to remove container '{container}': {source}")]
    Remove {
        container: String,
        #[source]
        source: ClientError,
    },

    #[error("Failed to create container '{container}': {source}")]
    Create {
        container: String,
        #[source]
        source: ClientError,
    },

    #[error("Failed to start container '{container}': {source}")]
    Start {
        container: String,
        #[source]
        source: ClientError,
    },

    /// Start keeps failing on a missing passwd entry after the user override was cleared
    #[error("Container '{container}' has no usable user in its passwd database: {source}")]
    PasswdEntry {
        container: String,
        #[source]
        source: ClientError,
    },

    /// The watch list resolved to nothing
    #[error("No watched containers found")]
    NoContainers,

    #[error("Update task for container '{container}' aborted: {message}")]
    TaskAborted { container: String, message: String },
}

impl GuardError {
    /// Classifies a failed registry fetch
    pub fn remote(reference: &ImageReference, source: ClientError) -> Self {
        let reference = reference.to_string();
        match source {
            ClientError::Registry(_)
            | ClientError::NotFound(_)
            | ClientError::Docker(_)
            | ClientError::Timeout { .. } => Self::RemoteFetch { reference, source },
            _ => Self::RemoteImage { reference, source },
        }
    }

    /// Short name of the error kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ListContainers { .. } | Self::Discovery { .. } | Self::Mirrors { .. } => {
                "discovery"
            }
            Self::ReferenceParse { .. } => "reference_parse",
            Self::RemoteFetch { .. } => "remote_fetch",
            Self::RemoteImage { .. } => "remote_image",
            Self::Evaluation { .. } => "evaluation",
            Self::Pull { .. } => "pull",
            Self::Inspect { .. } => "inspect",
            Self::Remove { .. } => "remove",
            Self::Create { .. } => "create",
            Self::Start { .. } => "start",
            Self::PasswdEntry { .. } => "passwd_entry",
            Self::NoContainers => "no_containers",
            Self::TaskAborted { .. } => "task_aborted",
        }
    }
}

/// Ordered collection of independent failures
#[derive(Debug, Default)]
pub struct ErrorList(Vec<GuardError>);

impl ErrorList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: GuardError) {
        self.0.push(error);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GuardError> {
        self.0.iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no errors");
        }
        for (idx, error) in self.0.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl FromIterator<GuardError> for ErrorList {
    fn from_iter<I: IntoIterator<Item = GuardError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ErrorList {
    type Item = GuardError;
    type IntoIter = std::vec::IntoIter<GuardError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_list_keeps_every_failure_in_order() {
        let errors: ErrorList = vec![
            GuardError::RemoteFetch {
                reference: "a/library/nginx:1".to_string(),
                source: ClientError::NotFound("a".to_string()),
            },
            GuardError::RemoteFetch {
                reference: "b/library/nginx:1".to_string(),
                source: ClientError::NotFound("b".to_string()),
            },
        ]
        .into_iter()
        .collect();

        assert_eq!(errors.len(), 2);
        let rendered = errors.to_string();
        let first = rendered.find("a/library").unwrap();
        let second = rendered.find("b/library").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_remote_classification() {
        let reference = ImageReference::new("docker.io", "library/nginx", "1.25");

        let fetch = GuardError::remote(&reference, ClientError::NotFound("gone".to_string()));
        assert_eq!(fetch.kind(), "remote_fetch");

        let image = GuardError::remote(&reference, ClientError::MissingField("created".to_string()));
        assert_eq!(image.kind(), "remote_image");

        let stalled = GuardError::remote(
            &reference,
            ClientError::Timeout {
                reference: reference.to_string(),
                after: std::time::Duration::from_secs(30),
            },
        );
        assert_eq!(stalled.kind(), "remote_fetch");
    }
}
