//! Reference resolution
//!
//! Turns a `repository:tag` string into a registry reference and, for images
//! of the default public registry, points it at a mirror host.

use guard_core::ImageReference;
use oci_distribution::Reference;
use reqwest::Url;

use crate::error::{ClientError, Result};

/// Parses a repository reference ("nginx:1.25", "ghcr.io/acme/app@sha256:...")
pub fn parse(repo_tag: &str) -> Result<ImageReference> {
    let reference = Reference::try_from(repo_tag)
        .map_err(|e| ClientError::invalid_reference(repo_tag, e))?;

    Ok(ImageReference {
        registry: reference.registry().to_string(),
        repository: reference.repository().to_string(),
        tag: reference.tag().map(str::to_string),
        digest: reference.digest().map(str::to_string),
        insecure: false,
        via_mirror: false,
    })
}

/// Resolves `repo_tag` against a mirror endpoint
///
/// Only references into the default public registry are rewritten; any
/// other registry is returned unchanged and the mirror is ignored. An empty
/// mirror also leaves the reference as parsed. A mirror given with the
/// `http` scheme marks the reference as insecure.
///
/// # Arguments
/// * `mirror` - Mirror URL (e.g. "http://127.0.0.1:5000"), possibly empty
/// * `repo_tag` - Repository reference to resolve
pub fn resolve(mirror: &str, repo_tag: &str) -> Result<ImageReference> {
    let reference = parse(repo_tag)?;

    if !reference.is_default_registry() || mirror.trim().is_empty() {
        return Ok(reference);
    }

    let (host, insecure) = mirror_host(mirror)?;
    Ok(reference.on_mirror(host, insecure))
}

/// Converts a resolved reference into the registry client's reference type
pub fn to_oci(reference: &ImageReference) -> Reference {
    match &reference.digest {
        Some(digest) => Reference::with_digest(
            reference.registry.clone(),
            reference.repository.clone(),
            digest.clone(),
        ),
        None => Reference::with_tag(
            reference.registry.clone(),
            reference.repository.clone(),
            reference.identifier().to_string(),
        ),
    }
}

/// Extracts `host[:port]` and the transport security from a mirror URL
fn mirror_host(mirror: &str) -> Result<(String, bool)> {
    let url = Url::parse(mirror.trim()).map_err(|e| ClientError::invalid_mirror(mirror, e))?;

    let insecure = match url.scheme() {
        "http" => true,
        "https" => false,
        other => {
            return Err(ClientError::invalid_mirror(
                mirror,
                format!("unsupported scheme '{}'", other),
            ));
        }
    };

    let host = url
        .host_str()
        .ok_or_else(|| ClientError::invalid_mirror(mirror, "missing host"))?;

    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    Ok((host, insecure))
}
