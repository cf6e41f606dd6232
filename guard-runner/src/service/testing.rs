//! Recording fakes for the runtime and registry clients

use async_trait::async_trait;
use bollard::models::ContainerConfig;
use chrono::{DateTime, TimeZone, Utc};
use guard_client::{
    ClientError, ContainerRuntime, ContainerSnapshot, ContainerSpec, LocalImage, RegistryClient,
    Result,
};
use guard_core::{ImageInfo, ImageReference, PullTarget};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Fixed point in time tests build timestamps from
pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
}

#[derive(Default)]
struct RuntimeState {
    running: Vec<String>,
    containers: HashMap<String, ContainerSnapshot>,
    images: HashMap<String, LocalImage>,
    mirrors: Vec<String>,
    mirrors_fail: bool,
    failing_pulls: HashSet<String>,
    failing_inspects: HashSet<String>,
    /// Removes that still succeed before every further remove fails
    failing_removes: HashMap<String, usize>,
    failing_creates: HashSet<String>,
    start_failures: HashMap<String, VecDeque<String>>,
    ids: HashMap<String, String>,
    created: Vec<(String, ContainerSpec)>,
    calls: Vec<String>,
}

/// In-memory container runtime that records every mutating call
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn with_running(self, names: &[&str]) -> Self {
        self.set_running(names);
        self
    }

    pub fn set_running(&self, names: &[&str]) {
        self.state.lock().unwrap().running = names.iter().map(|n| n.to_string()).collect();
    }

    /// Registers a container running `repo_tag`, built at `created`
    pub fn with_container(
        self,
        name: &str,
        repo_tag: &str,
        image_id: &str,
        created: DateTime<Utc>,
        networks: &[&str],
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.containers.insert(
                name.to_string(),
                ContainerSnapshot {
                    name: name.to_string(),
                    image_id: image_id.to_string(),
                    config: ContainerConfig {
                        image: Some(repo_tag.to_string()),
                        user: Some("app".to_string()),
                        ..Default::default()
                    },
                    host_config: None,
                    networks: networks.iter().map(|n| n.to_string()).collect(),
                },
            );
            state.images.insert(
                image_id.to_string(),
                LocalImage {
                    id: image_id.to_string(),
                    created,
                    repo_tags: vec![repo_tag.to_string()],
                },
            );
        }
        self
    }

    pub fn with_mirrors(self, mirrors: &[&str]) -> Self {
        self.state.lock().unwrap().mirrors = mirrors.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn fail_mirrors(self) -> Self {
        self.state.lock().unwrap().mirrors_fail = true;
        self
    }

    pub fn fail_pull(self, source: &str) -> Self {
        self.state.lock().unwrap().failing_pulls.insert(source.to_string());
        self
    }

    pub fn fail_inspect(self, name: &str) -> Self {
        self.state.lock().unwrap().failing_inspects.insert(name.to_string());
        self
    }

    pub fn fail_remove(self, name: &str) -> Self {
        self.fail_remove_after(name, 0)
    }

    /// Lets the first `successes` removes of `name` through, fails the rest
    pub fn fail_remove_after(self, name: &str, successes: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_removes
            .insert(name.to_string(), successes);
        self
    }

    /// Replaces the repo tags Docker lists for an image
    pub fn with_repo_tags(self, image_id: &str, repo_tags: &[&str]) -> Self {
        if let Some(image) = self.state.lock().unwrap().images.get_mut(image_id) {
            image.repo_tags = repo_tags.iter().map(|t| t.to_string()).collect();
        }
        self
    }

    pub fn fail_create(self, name: &str) -> Self {
        self.state.lock().unwrap().failing_creates.insert(name.to_string());
        self
    }

    /// Queues a start failure for `name`; each start consumes one
    pub fn fail_start(self, name: &str, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .start_failures
            .entry(name.to_string())
            .or_default()
            .push_back(message.to_string());
        self
    }

    /// Calls made for one container, in order ("pull:<src>", "remove", "create", "start")
    pub fn calls_for(&self, name: &str) -> Vec<String> {
        let prefix = format!("{}:", name);
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Specs passed to create for one container
    pub fn created_specs(&self, name: &str) -> Vec<ContainerSpec> {
        self.state
            .lock()
            .unwrap()
            .created
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, spec)| spec.clone())
            .collect()
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.contains(":pull:"))
            .cloned()
            .collect()
    }

    fn record(&self, name: &str, call: &str) {
        self.state.lock().unwrap().calls.push(format!("{}:{}", name, call));
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_running(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().running.clone())
    }

    async fn inspect_container(&self, name: &str) -> Result<ContainerSnapshot> {
        let state = self.state.lock().unwrap();
        if state.failing_inspects.contains(name) {
            return Err(ClientError::Runtime(format!("inspect {} failed", name)));
        }
        state
            .containers
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(name.to_string()))
    }

    async fn inspect_image(&self, image: &str) -> Result<LocalImage> {
        self.state
            .lock()
            .unwrap()
            .images
            .get(image)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(image.to_string()))
    }

    async fn registry_mirrors(&self) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        if state.mirrors_fail {
            return Err(ClientError::Runtime("info unavailable".to_string()));
        }
        Ok(state.mirrors.clone())
    }

    async fn pull_image(&self, target: &PullTarget) -> Result<()> {
        // Pulls are keyed by source; record under a pseudo container name
        self.record("image", &format!("pull:{}", target.source));
        if self.state.lock().unwrap().failing_pulls.contains(&target.source) {
            return Err(ClientError::Runtime(format!("pull {} failed", target.source)));
        }
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        self.record(name, "remove");
        let mut state = self.state.lock().unwrap();
        if let Some(successes) = state.failing_removes.get_mut(name) {
            if *successes == 0 {
                return Err(ClientError::NotFound(name.to_string()));
            }
            *successes -= 1;
        }
        state.ids.retain(|_, n| n != name);
        Ok(())
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> Result<String> {
        self.record(name, "create");
        let mut state = self.state.lock().unwrap();
        if state.failing_creates.contains(name) {
            return Err(ClientError::Runtime(format!("create {} failed", name)));
        }
        let id = format!("{}-{}", name, state.created.len());
        state.ids.insert(id.clone(), name.to_string());
        state.created.push((name.to_string(), spec.clone()));
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let name = self
            .state
            .lock()
            .unwrap()
            .ids
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(id.to_string()))?;
        self.record(&name, "start");

        let failure = self
            .state
            .lock()
            .unwrap()
            .start_failures
            .get_mut(&name)
            .and_then(VecDeque::pop_front);
        match failure {
            Some(message) => Err(ClientError::Runtime(message)),
            None => Ok(()),
        }
    }
}

/// In-memory registry keyed by full reference ("host/repository:tag")
#[derive(Default)]
pub struct FakeRegistry {
    images: Mutex<HashMap<String, (DateTime<Utc>, String)>>,
    stalled: Mutex<HashSet<String>>,
    fetches: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn with_image(self, reference: &str, created: DateTime<Utc>, image_id: &str) -> Self {
        self.images
            .lock()
            .unwrap()
            .insert(reference.to_string(), (created, image_id.to_string()));
        self
    }

    /// Makes fetches of `reference` never complete
    pub fn stall(self, reference: &str) -> Self {
        self.stalled.lock().unwrap().insert(reference.to_string());
        self
    }

    pub fn fetches(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn fetch(&self, reference: &ImageReference) -> Result<ImageInfo> {
        let key = reference.to_string();
        self.fetches.lock().unwrap().push(key.clone());

        let stalled = self.stalled.lock().unwrap().contains(&key);
        if stalled {
            futures::future::pending::<()>().await;
        }

        let images = self.images.lock().unwrap();
        let (created, image_id) = images
            .get(&key)
            .ok_or_else(|| ClientError::NotFound(key.clone()))?;
        Ok(ImageInfo::candidate(*created, reference.clone(), image_id.clone()))
    }
}
