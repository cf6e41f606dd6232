//! Guard Core
//!
//! Core types for the image guard.
//!
//! This crate contains:
//! - Domain types: images, references and watched containers
//! - The candidate selection policy used to decide whether a container is outdated

pub mod domain;

pub use domain::container::{ContainerInfo, Freshness};
pub use domain::decision::{LocalTag, PullTarget, UpdateDecision};
pub use domain::image::{DEFAULT_REGISTRY, ImageInfo, ImageReference};
