//! Remote image metadata
//!
//! Fetches the creation time and content identifier of an image straight
//! from a registry, without pulling any layers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guard_core::{ImageInfo, ImageReference};
use oci_distribution::Client;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::credentials::CredentialStore;
use crate::error::{ClientError, Result};
use crate::reference::to_oci;

/// Registry operations the guard needs
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetches remote metadata for a resolved reference
    ///
    /// # Returns
    /// Candidate image info carrying the reference it was fetched through
    async fn fetch(&self, reference: &ImageReference) -> Result<ImageInfo>;
}

/// Transport settings for registry connections
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrySettings {
    /// Accept self-signed or otherwise unverifiable mirror certificates
    pub accept_invalid_certificates: bool,
}

/// Subset of the OCI image config we read
#[derive(Debug, Deserialize)]
struct ImageConfigFile {
    created: Option<String>,
}

/// Registry client speaking the OCI distribution protocol
///
/// Keeps one HTTP client per registry host and transport for the life of the
/// process, so connections are pooled and reused across runs. Requests are
/// not bounded here; callers put a deadline on `fetch`.
pub struct OciRegistryClient {
    settings: RegistrySettings,
    credentials: CredentialStore,
    clients: Mutex<HashMap<(String, bool), Client>>,
}

impl OciRegistryClient {
    /// Creates a registry client
    ///
    /// # Arguments
    /// * `settings` - Transport settings
    /// * `credentials` - Source of registry credentials
    pub fn new(settings: RegistrySettings, credentials: CredentialStore) -> Self {
        Self {
            settings,
            credentials,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the pooled client for a registry host, creating it on first use
    fn client_for(&self, reference: &ImageReference) -> Client {
        let key = (reference.registry.clone(), reference.insecure);
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        clients
            .entry(key)
            .or_insert_with(|| {
                debug!(
                    registry = %reference.registry,
                    insecure = reference.insecure,
                    "Creating registry client"
                );
                Client::new(ClientConfig {
                    protocol: if reference.insecure {
                        ClientProtocol::Http
                    } else {
                        ClientProtocol::Https
                    },
                    accept_invalid_certificates: self.settings.accept_invalid_certificates,
                    ..Default::default()
                })
            })
            .clone()
    }
}

#[async_trait]
impl RegistryClient for OciRegistryClient {
    async fn fetch(&self, reference: &ImageReference) -> Result<ImageInfo> {
        let client = self.client_for(reference);
        let auth = self.credentials.auth_for(reference).await;
        let oci_reference = to_oci(reference);

        debug!(reference = %reference, "Fetching remote image config");

        let (manifest, _digest, config) = client
            .pull_manifest_and_config(&oci_reference, &auth)
            .await?;

        let created = parse_created(&config)?;
        Ok(ImageInfo::candidate(
            created,
            reference.clone(),
            manifest.config.digest,
        ))
    }
}

/// Reads the `created` timestamp from a raw image config blob
pub fn parse_created(config: &str) -> Result<DateTime<Utc>> {
    let file: ImageConfigFile = serde_json::from_str(config)?;
    let created = file
        .created
        .ok_or_else(|| ClientError::MissingField("created".to_string()))?;
    parse_timestamp(&created)
}

/// Parses an RFC 3339 timestamp as reported by registries and the Docker API
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| ClientError::InvalidTimestamp {
            value: value.to_string(),
            source,
        })
}
