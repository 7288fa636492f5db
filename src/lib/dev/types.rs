use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::lib::{
    cleanup::types::Cleanup,
    config::types::{ConfigError, NhostConfig, RunContext},
    engine::types::EngineError,
    health::health::HealthGate,
    lifecycle::types::Lifecycle,
    migrations::types::{MigrationError, MigrationRunner},
    services::types::{ContainerSpec, SpecError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Init,
    PortsChecked,
    SpecsBuilt,
    ImagesReady,
    ContainersStarted,
    HealthChecked,
    MigrationsApplied,
    ConsoleRunning,
    Interrupted,
    Completed,
    RollingBack,
    Terminated,
}

#[derive(Debug, Error)]
pub enum DevError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("ports {0:?} are already in use, hence aborting\nchange nhost/config.yaml or stop the services")]
    PortsInUse(Vec<u16>),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to generate container configurations: {0}")]
    Spec(#[from] SpecError),

    #[error("failed to write docker api config {path}: {source}")]
    Artifact {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start GraphQL Engine")]
    Unhealthy,

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("interrupted by signal")]
    Interrupted,

    #[error("invalid run state transition from {from:?} to {to:?}")]
    InvalidTransition { from: RunState, to: RunState },
}

impl DevError {
    /// Failures raised before any container could exist; nothing to roll back.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            DevError::Config(_) | DevError::PortsInUse(_) | DevError::Engine(EngineError::Connect(_))
        )
    }
}

pub type DevResult<T> = Result<T, DevError>;

/// One `nhost dev` session, from port check to teardown.
pub struct DevRun {
    pub ctx: RunContext,
    pub config: NhostConfig,
    pub env_vars: Vec<String>,
    pub first_run: bool,
    pub state: RunState,
    pub specs: Vec<ContainerSpec>,
    pub lifecycle: Lifecycle,
    pub health: HealthGate,
    pub migrations: Arc<dyn MigrationRunner>,
    pub cleanup: Arc<Cleanup>,
    pub cancel: CancellationToken,
}
