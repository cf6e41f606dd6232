//! Registry credential discovery
//!
//! Reads the Docker CLI config file (`config.json`) the same way `docker
//! login` writes it. Anything missing falls back to anonymous access.

use base64::{Engine, engine::general_purpose::STANDARD};
use guard_core::ImageReference;
use oci_distribution::secrets::RegistryAuth;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
}

/// Credential source backed by a Docker CLI config directory
#[derive(Debug, Clone)]
pub struct CredentialStore {
    config_dir: Option<PathBuf>,
}

impl CredentialStore {
    /// Creates a store reading `<config_dir>/config.json`
    ///
    /// With `None`, `$DOCKER_CONFIG` and then `~/.docker` are used.
    pub fn new(config_dir: Option<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.or_else(default_config_dir),
        }
    }

    /// Store that always answers anonymous
    pub fn anonymous() -> Self {
        Self { config_dir: None }
    }

    /// Looks up credentials for the registry of `reference`
    ///
    /// The file is read on every call so `docker login` takes effect on the next run.
    pub async fn auth_for(&self, reference: &ImageReference) -> RegistryAuth {
        let Some(dir) = &self.config_dir else {
            return RegistryAuth::Anonymous;
        };

        let path = dir.join("config.json");
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No docker config, using anonymous access");
                return RegistryAuth::Anonymous;
            }
        };

        let file: DockerConfigFile = match serde_json::from_slice(&raw) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable docker config");
                return RegistryAuth::Anonymous;
            }
        };

        match lookup(&file, reference) {
            Some((username, password)) => RegistryAuth::Basic(username, password),
            None => RegistryAuth::Anonymous,
        }
    }
}

fn default_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".docker"))
}

/// Strips scheme and path from an `auths` key ("https://index.docker.io/v1/" -> "index.docker.io")
fn normalize_key(key: &str) -> &str {
    let key = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    key.split('/').next().unwrap_or(key)
}

fn lookup(file: &DockerConfigFile, reference: &ImageReference) -> Option<(String, String)> {
    let entry = file.auths.iter().find_map(|(key, entry)| {
        let host = normalize_key(key);
        let probe = ImageReference {
            registry: host.to_string(),
            ..reference.clone()
        };
        let matches = host == reference.registry
            || (reference.is_default_registry() && probe.is_default_registry());
        matches.then_some(entry)
    })?;

    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        return Some((username.clone(), password.clone()));
    }

    let decoded = STANDARD.decode(entry.auth.as_deref()?).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
