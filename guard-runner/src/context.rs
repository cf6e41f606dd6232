//! Long-lived guard context
//!
//! Built once at startup and shared by every run:
//! - Container runtime client
//! - Registry client
//! - Watch list (configured, or discovered on the first run that finds containers)

use guard_client::{ClientError, ContainerRuntime, RegistryClient};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Clients and watch list shared across runs
pub struct GuardContext {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<dyn RegistryClient>,

    /// Container names given in configuration
    configured: Vec<String>,

    /// Watch list, fixed once it is first resolved to something non-empty
    watch_list: OnceCell<Vec<String>>,
}

impl GuardContext {
    /// Creates the shared context
    ///
    /// # Arguments
    /// * `runtime` - Container runtime client
    /// * `registry` - Registry client
    /// * `containers` - Containers to watch; empty means every running container
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<dyn RegistryClient>,
        containers: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            registry,
            configured: containers,
            watch_list: OnceCell::new(),
        })
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn registry(&self) -> &Arc<dyn RegistryClient> {
        &self.registry
    }

    /// Returns the containers to watch
    ///
    /// Without a configured list, the running containers are discovered
    /// and that result is kept for later runs. An empty discovery is not
    /// kept, so the next run tries again.
    pub async fn watch_list(&self) -> Result<Vec<String>, ClientError> {
        if let Some(list) = self.watch_list.get() {
            return Ok(list.clone());
        }

        let list = if self.configured.is_empty() {
            let discovered = self.runtime.list_running().await?;
            if discovered.is_empty() {
                return Ok(discovered);
            }
            discovered
        } else {
            self.configured.clone()
        };

        info!("Watching containers: {}", list.join(","));

        // A concurrent first run may have won the race; either list is valid.
        let _ = self.watch_list.set(list);
        Ok(self.watch_list.get().cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{FakeRegistry, FakeRuntime};

    #[tokio::test]
    async fn test_configured_list_wins() {
        let runtime = Arc::new(FakeRuntime::default().with_running(&["db", "web"]));
        let context = GuardContext::new(
            runtime,
            Arc::new(FakeRegistry::default()),
            vec!["web".to_string()],
        );

        assert_eq!(context.watch_list().await.unwrap(), vec!["web"]);
    }

    #[tokio::test]
    async fn test_discovery_is_cached_after_first_run() {
        let runtime = Arc::new(FakeRuntime::default().with_running(&["db", "web"]));
        let context = GuardContext::new(runtime.clone(), Arc::new(FakeRegistry::default()), vec![]);

        assert_eq!(context.watch_list().await.unwrap(), vec!["db", "web"]);

        runtime.set_running(&["db", "web", "cache"]);
        assert_eq!(context.watch_list().await.unwrap(), vec!["db", "web"]);
    }

    #[tokio::test]
    async fn test_empty_discovery_is_retried() {
        let runtime = Arc::new(FakeRuntime::default());
        let context = GuardContext::new(runtime.clone(), Arc::new(FakeRegistry::default()), vec![]);

        assert!(context.watch_list().await.unwrap().is_empty());

        runtime.set_running(&["web"]);
        assert_eq!(context.watch_list().await.unwrap(), vec!["web"]);
    }
}
