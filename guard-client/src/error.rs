//! Error types for the runtime and registry clients

use std::time::Duration;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Message the runtime reports when a container's user is missing from its passwd database
pub const PASSWD_ENTRY_SIGNATURE: &str = "no matching entries in passwd file";

/// Errors that can occur when talking to the container runtime or a registry
#[derive(Debug, Error)]
pub enum ClientError {
    /// Docker Engine API call failed
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// Registry request failed
    #[error("Registry error: {0}")]
    Registry(#[from] oci_distribution::errors::OciDistributionError),

    /// Image reference could not be parsed
    #[error("Invalid image reference '{reference}': {message}")]
    InvalidReference {
        /// Reference as given
        reference: String,
        /// Parser message
        message: String,
    },

    /// Mirror endpoint could not be parsed
    #[error("Invalid mirror '{mirror}': {message}")]
    InvalidMirror {
        /// Mirror as given
        mirror: String,
        /// Parser message
        message: String,
    },

    /// A response was missing a field the client depends on
    #[error("Missing field: {0}")]
    MissingField(String),

    /// A timestamp could not be parsed
    #[error("Invalid timestamp '{value}': {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// JSON payload could not be decoded
    #[error("Malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A registry did not answer within the fetch deadline
    #[error("Timed out after {after:?} waiting for {reference}")]
    Timeout { reference: String, after: Duration },

    /// Runtime reported a failure outside the API error shapes
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl ClientError {
    /// Create an invalid reference error
    pub fn invalid_reference(reference: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidReference {
            reference: reference.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid mirror error
    pub fn invalid_mirror(mirror: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidMirror {
            mirror: mirror.into(),
            message: message.to_string(),
        }
    }

    /// Check if a container failed to start because its user has no passwd entry
    pub fn is_missing_passwd_entry(&self) -> bool {
        self.to_string().contains(PASSWD_ENTRY_SIGNATURE)
    }
}
