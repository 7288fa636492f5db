//! In-memory engine for tests. Records every call so ordering can be
//! asserted, and can be told to fail individual pulls or starts.

use std::{collections::HashSet, sync::Mutex};

use async_trait::async_trait;

use super::types::{
    ContainerHandle, ContainerState, Engine, EngineContainer, EngineError, EngineImage,
    EngineResult, StopOutcome,
};
use crate::lib::services::types::ContainerSpec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    ListImages,
    Pull(String),
    ListContainers,
    Create(String),
    Start(String),
    Stop(String),
    Remove(String),
}

#[derive(Debug, Default)]
struct MockState {
    images: Vec<String>,
    containers: Vec<EngineContainer>,
    calls: Vec<EngineCall>,
    fail_pull: HashSet<String>,
    fail_start: HashSet<String>,
    next_id: u32,
}

#[derive(Debug, Default)]
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn with_images(images: &[&str]) -> Self {
        let engine = MockEngine::default();
        engine.state.lock().unwrap().images = images.iter().map(|s| s.to_string()).collect();
        engine
    }

    pub fn fail_pull(&self, image: &str) {
        self.state.lock().unwrap().fail_pull.insert(image.to_string());
    }

    /// Makes `start_container` fail for the container named `name`.
    pub fn fail_start(&self, name: &str) {
        self.state.lock().unwrap().fail_start.insert(name.to_string());
    }

    /// Registers a container that already exists in the engine.
    pub fn add_container(&self, name: &str, running: bool) {
        let state = if running {
            ContainerState::Running
        } else {
            ContainerState::Exited
        };
        self.add_container_in(name, state);
    }

    pub fn add_container_in(&self, name: &str, container_state: ContainerState) {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("mock-{}", state.next_id);
        state.containers.push(EngineContainer {
            id,
            names: vec![format!("/{name}")],
            state: container_state,
        });
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn pulls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Pull(image) => Some(image),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Create(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                EngineCall::Stop(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Names of containers that would still need a stop.
    pub fn live(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|c| c.state.is_live())
            .flat_map(|c| c.names.clone())
            .collect()
    }
}

#[async_trait]
impl Engine for MockEngine {
    async fn list_images(&self) -> EngineResult<Vec<EngineImage>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::ListImages);
        Ok(state
            .images
            .iter()
            .map(|tag| EngineImage {
                repo_tags: vec![tag.clone()],
            })
            .collect())
    }

    async fn pull_image(&self, image: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::Pull(image.to_string()));
        if state.fail_pull.contains(image) {
            return Err(EngineError::Pull {
                image: image.to_string(),
                message: "manifest unknown".to_string(),
            });
        }
        state.images.push(image.to_string());
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> EngineResult<Vec<EngineContainer>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::ListContainers);
        Ok(state
            .containers
            .iter()
            .filter(|c| all || c.state.is_live())
            .cloned()
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<ContainerHandle> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::Create(spec.name.clone()));
        if !state.images.contains(&spec.image) {
            return Err(EngineError::request(
                "create container",
                &spec.name,
                format!("No such image: {}", spec.image),
            ));
        }
        let taken = state
            .containers
            .iter()
            .any(|c| c.names.contains(&format!("/{}", spec.name)));
        if taken {
            return Err(EngineError::request(
                "create container",
                &spec.name,
                "Conflict. The container name is already in use",
            ));
        }

        state.next_id += 1;
        let id = format!("mock-{}", state.next_id);
        state.containers.push(EngineContainer {
            id: id.clone(),
            names: vec![format!("/{}", spec.name)],
            state: ContainerState::Created,
        });
        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::Start(id.to_string()));
        let fail_start = state.fail_start.clone();
        let container = state
            .containers
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| EngineError::request("start container", id, "No such container"))?;
        if fail_start.iter().any(|name| container.name_contains(name)) {
            return Err(EngineError::request("start container", id, "port is already allocated"));
        }
        container.state = ContainerState::Running;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> EngineResult<StopOutcome> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::Stop(id.to_string()));
        match state.containers.iter_mut().find(|c| c.id == id) {
            None => Ok(StopOutcome::NotFound),
            Some(container) if !container.state.is_live() => Ok(StopOutcome::AlreadyStopped),
            Some(container) => {
                container.state = ContainerState::Exited;
                Ok(StopOutcome::Stopped)
            }
        }
    }

    async fn remove_container(&self, id: &str) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::Remove(id.to_string()));
        if state.containers.iter().any(|c| c.id == id && c.state.is_live()) {
            return Err(EngineError::request(
                "remove container",
                id,
                "You cannot remove a running container",
            ));
        }
        state.containers.retain(|c| c.id != id);
        Ok(())
    }
}
