//! Docker Engine runtime
//!
//! `ContainerRuntime` implementation over the Docker Engine API.

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    NetworkingConfig, RemoveContainerOptions, StartContainerOptions,
};
use bollard::image::{CreateImageOptions, TagImageOptions};
use bollard::models::EndpointSettings;
use futures::StreamExt;
use guard_core::PullTarget;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::registry::parse_timestamp;
use crate::runtime::{ContainerRuntime, ContainerSnapshot, ContainerSpec, LocalImage};

/// Docker Engine client
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects using `DOCKER_HOST` or the platform's default socket
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self) -> Result<Vec<String>> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .filter_map(|c| c.names.and_then(|names| names.into_iter().next()))
            .map(|name| name.trim_start_matches('/').to_string())
            .collect())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerSnapshot> {
        let response = self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await?;

        let image_id = response
            .image
            .ok_or_else(|| ClientError::MissingField(format!("{}: image", name)))?;
        let config = response
            .config
            .ok_or_else(|| ClientError::MissingField(format!("{}: config", name)))?;

        let mut networks: Vec<String> = response
            .network_settings
            .and_then(|settings| settings.networks)
            .map(|networks| networks.into_keys().collect())
            .unwrap_or_default();
        networks.sort();

        Ok(ContainerSnapshot {
            name: response
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| name.to_string()),
            image_id,
            config,
            host_config: response.host_config,
            networks,
        })
    }

    async fn inspect_image(&self, image: &str) -> Result<LocalImage> {
        let response = self.docker.inspect_image(image).await?;

        let created = response
            .created
            .ok_or_else(|| ClientError::MissingField(format!("{}: created", image)))?;

        Ok(LocalImage {
            id: response.id.unwrap_or_else(|| image.to_string()),
            created: parse_timestamp(&created)?,
            repo_tags: response.repo_tags.unwrap_or_default(),
        })
    }

    async fn registry_mirrors(&self) -> Result<Vec<String>> {
        let info = self.docker.info().await?;

        Ok(info
            .registry_config
            .and_then(|registry| registry.mirrors)
            .unwrap_or_default())
    }

    async fn pull_image(&self, target: &PullTarget) -> Result<()> {
        info!(image = %target.source, "Pulling image");

        let options = CreateImageOptions {
            from_image: target.source.clone(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            if let Some(status) = progress?.status {
                debug!(image = %target.source, status = %status, "Pull progress");
            }
        }

        if let Some(local) = &target.local {
            let options = TagImageOptions {
                repo: local.repository.clone(),
                tag: local.tag.clone(),
            };
            self.docker.tag_image(&target.source, Some(options)).await?;
            debug!(image = %target.source, tag = %target.image(), "Tagged pulled image");
        }

        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker.remove_container(name, Some(options)).await?;
        debug!(container = %name, "Container removed");
        Ok(())
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> Result<String> {
        let endpoints: HashMap<String, EndpointSettings> = spec
            .networks
            .iter()
            .map(|network| (network.clone(), EndpointSettings::default()))
            .collect();

        let mut config: Config<String> = spec.config.clone().into();
        config.image = Some(spec.image.clone());
        config.user = spec.user.clone();
        config.host_config = spec.host_config.clone();
        config.networking_config = Some(NetworkingConfig {
            endpoints_config: endpoints,
        });

        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        let response = self.docker.create_container(Some(options), config).await?;
        debug!(container = %name, id = %response.id, "Container created");
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }
}
