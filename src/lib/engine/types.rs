use async_trait::async_trait;
use thiserror::Error;

use crate::lib::services::types::ContainerSpec;

/// A container that exists in the engine because a create call succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineImage {
    pub repo_tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Running,
    Restarting,
    Paused,
    Exited,
    Dead,
    Unknown,
}

impl ContainerState {
    /// Still holds its process (or will again shortly) and needs a stop.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            ContainerState::Running | ContainerState::Restarting | ContainerState::Paused
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineContainer {
    pub id: String,
    /// As reported by the engine, usually with a leading `/`.
    pub names: Vec<String>,
    pub state: ContainerState,
}

impl EngineContainer {
    pub fn name_contains(&self, needle: &str) -> bool {
        self.names.iter().any(|name| name.contains(needle))
    }

    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    AlreadyStopped,
    NotFound,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to connect to docker client: {0}")]
    Connect(#[source] bollard::errors::Error),

    #[error("failed to {action} {target}: {message}")]
    Request {
        action: &'static str,
        target: String,
        message: String,
    },

    #[error("failed to pull image {image}: {message}\nplease pull it manually with `docker pull {image}` and re-run `nhost dev`")]
    Pull { image: String, message: String },
}

impl EngineError {
    pub fn request(action: &'static str, target: impl Into<String>, err: impl ToString) -> Self {
        EngineError::Request {
            action,
            target: target.into(),
            message: err.to_string(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// The slice of the container engine's management API this tool needs.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn list_images(&self) -> EngineResult<Vec<EngineImage>>;

    /// Pulls `image` and returns once the engine reports the pull finished.
    async fn pull_image(&self, image: &str) -> EngineResult<()>;

    async fn list_containers(&self, all: bool) -> EngineResult<Vec<EngineContainer>>;

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<ContainerHandle>;

    async fn start_container(&self, id: &str) -> EngineResult<()>;

    async fn stop_container(&self, id: &str) -> EngineResult<StopOutcome>;

    /// Removes a stopped container. Removing one that is already gone is not an error.
    async fn remove_container(&self, id: &str) -> EngineResult<()>;
}
