//! Image domain model
//!
//! An image shows up in two roles during a run: as the image a container is
//! currently running (read from the container runtime) and as a candidate
//! fetched from a registry mirror.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical host of the default public registry
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Hosts that all name the default public registry
const DEFAULT_REGISTRY_ALIASES: &[&str] = &[
    "docker.io",
    "index.docker.io",
    "registry-1.docker.io",
    "registry.hub.docker.com",
];

/// Fully qualified pointer to an image in a registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// Registry host, including the port when one is set (e.g. "127.0.0.1:5000")
    pub registry: String,

    /// Repository path inside the registry (e.g. "library/nginx")
    pub repository: String,

    /// Tag, if the reference names one
    pub tag: Option<String>,

    /// Digest, if the reference pins one
    pub digest: Option<String>,

    /// Plain HTTP transport is allowed for this registry
    pub insecure: bool,

    /// The registry host was rewritten to point at a mirror of the default registry
    pub via_mirror: bool,
}

impl ImageReference {
    /// Creates a tagged reference over secure transport
    pub fn new(
        registry: impl Into<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            registry: registry.into(),
            repository: repository.into(),
            tag: Some(tag.into()),
            digest: None,
            insecure: false,
            via_mirror: false,
        }
    }

    /// Returns a copy of this reference pointing at a mirror host
    ///
    /// Repository path, tag and digest are kept as they are.
    pub fn on_mirror(&self, host: impl Into<String>, insecure: bool) -> Self {
        Self {
            registry: host.into(),
            insecure,
            via_mirror: true,
            ..self.clone()
        }
    }

    /// Whether the registry host names the default public registry
    pub fn is_default_registry(&self) -> bool {
        DEFAULT_REGISTRY_ALIASES.contains(&self.registry.as_str())
    }

    /// Tag or digest identifying the image inside its repository
    ///
    /// A digest wins over a tag. A reference with neither means "latest".
    pub fn identifier(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or("latest")
    }

    /// Repository and identifier without the registry host
    pub fn short_name(&self) -> String {
        match &self.digest {
            Some(digest) => format!("{}@{}", self.repository, digest),
            None => format!("{}:{}", self.repository, self.identifier()),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.short_name())
    }
}

/// Metadata about one image
///
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// When the image was built
    pub created: DateTime<Utc>,

    /// Human readable reference the image was found under
    ///
    /// For a running container this is the local repo tag (e.g. "nginx:1.25"),
    /// for a candidate the full mirror reference.
    pub repository: String,

    /// Parsed reference the image was resolved through
    pub reference: ImageReference,

    /// Content identifier (config digest, "sha256:...")
    pub image_id: String,
}

impl ImageInfo {
    /// Creates image metadata from its parts
    pub fn new(
        created: DateTime<Utc>,
        repository: impl Into<String>,
        reference: ImageReference,
        image_id: impl Into<String>,
    ) -> Self {
        Self {
            created,
            repository: repository.into(),
            reference,
            image_id: image_id.into(),
        }
    }

    /// Creates candidate metadata, using the reference itself as the repository string
    pub fn candidate(
        created: DateTime<Utc>,
        reference: ImageReference,
        image_id: impl Into<String>,
    ) -> Self {
        let repository = reference.to_string();
        Self::new(created, repository, reference, image_id)
    }

    /// Identical content, regardless of tags or timestamps
    pub fn is_same_content(&self, other: &ImageInfo) -> bool {
        self.image_id == other.image_id
    }

    /// Strictly newer build than `other`
    pub fn is_newer_than(&self, other: &ImageInfo) -> bool {
        self.created > other.created
    }
}
