//! Container runtime abstraction
//!
//! The operations the guard needs from a container engine, expressed over
//! plain types so the update logic can be exercised without a daemon.

use async_trait::async_trait;
use bollard::models::{ContainerConfig, HostConfig};
use chrono::{DateTime, Utc};
use guard_core::PullTarget;

use crate::error::Result;

/// Current state of a container, as needed to recreate it
#[derive(Debug, Clone, Default)]
pub struct ContainerSnapshot {
    /// Container name without the leading slash
    pub name: String,

    /// ID of the image the container runs ("sha256:...")
    pub image_id: String,

    /// Container configuration as reported by the runtime
    pub config: ContainerConfig,

    /// Host configuration (mounts, ports, restart policy, ...)
    pub host_config: Option<HostConfig>,

    /// Names of the networks the container is attached to
    pub networks: Vec<String>,
}

/// Locally stored image metadata
#[derive(Debug, Clone)]
pub struct LocalImage {
    pub id: String,
    pub created: DateTime<Utc>,
    pub repo_tags: Vec<String>,
}

/// Everything needed to create a replacement container
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    /// Image the new container runs
    pub image: String,

    /// User to run as; `None` lets the image decide
    pub user: Option<String>,

    /// Remaining container configuration, carried over unchanged
    pub config: ContainerConfig,

    /// Host configuration, carried over unchanged
    pub host_config: Option<HostConfig>,

    /// Networks to attach to, by name only
    pub networks: Vec<String>,
}

impl ContainerSpec {
    /// Builds the spec that replaces `snapshot` with a container running `image`
    ///
    /// Network attachments keep only their names: fixed addresses are
    /// dropped so the runtime assigns fresh ones.
    pub fn replacing(snapshot: &ContainerSnapshot, image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            user: snapshot.config.user.clone().filter(|u| !u.is_empty()),
            config: snapshot.config.clone(),
            host_config: snapshot.host_config.clone(),
            networks: snapshot.networks.clone(),
        }
    }
}

/// Container engine operations
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Names of all running containers
    async fn list_running(&self) -> Result<Vec<String>>;

    /// Full configuration of a container
    async fn inspect_container(&self, name: &str) -> Result<ContainerSnapshot>;

    /// Metadata of a locally stored image
    async fn inspect_image(&self, image: &str) -> Result<LocalImage>;

    /// Registry mirrors configured on the engine, in priority order
    async fn registry_mirrors(&self) -> Result<Vec<String>>;

    /// Pulls `target.source` and applies the local tag, if any
    async fn pull_image(&self, target: &PullTarget) -> Result<()>;

    /// Stops and removes a container
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Creates a container and returns its ID
    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> Result<String>;

    /// Starts a created container
    async fn start_container(&self, id: &str) -> Result<()>;
}
