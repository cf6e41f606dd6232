//! Guard clients
//!
//! The external collaborators of the image guard, each behind a trait:
//! - `ContainerRuntime`: list, inspect, pull, remove, create and start
//!   containers (Docker Engine implementation in [`docker`])
//! - `RegistryClient`: remote image metadata over the OCI distribution
//!   protocol (implementation in [`registry`])
//!
//! Mirror-aware reference resolution lives in [`reference`].

pub mod credentials;
pub mod docker;
pub mod error;
pub mod reference;
pub mod registry;
pub mod runtime;

pub use credentials::CredentialStore;
pub use docker::DockerRuntime;
pub use error::{ClientError, PASSWD_ENTRY_SIGNATURE, Result};
pub use registry::{OciRegistryClient, RegistryClient, RegistrySettings};
pub use runtime::{ContainerRuntime, ContainerSnapshot, ContainerSpec, LocalImage};
