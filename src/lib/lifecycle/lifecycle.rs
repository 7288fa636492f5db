use std::sync::Arc;

use tracing::{debug, info, warn};

use super::types::Lifecycle;
use crate::lib::{
    engine::types::{ContainerHandle, Engine, EngineResult},
    services::types::ContainerSpec,
};

impl Lifecycle {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Lifecycle {
            engine,
            handles: Vec::new(),
        }
    }

    /// Creates and starts one container. The handle is tracked as soon as
    /// the create succeeds, so a failed start still leaves it visible.
    pub async fn start(&mut self, spec: ContainerSpec) -> EngineResult<ContainerHandle> {
        let handle = self.engine.create_container(&spec).await?;
        info!(container = %handle.name, id = %handle.id, "Container created");
        self.handles.push(handle.clone());

        self.engine.start_container(&handle.id).await?;
        info!(container = %handle.name, "Container started");
        Ok(handle)
    }

    /// Starts `specs` strictly in order; the first failure is returned and
    /// nothing after it is attempted.
    pub async fn start_all(&mut self, specs: Vec<ContainerSpec>) -> EngineResult<()> {
        for spec in specs {
            let name = spec.name.clone();
            if let Err(e) = self.start(spec).await {
                warn!(container = %name, error = %e, "Failed to start container");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Removes containers left over from an earlier run under the same
    /// names, so the create calls don't collide with them. Leftovers that
    /// are still live (a restart loop, say) are stopped first.
    pub async fn clear_stale(&self, specs: &[ContainerSpec]) -> EngineResult<Vec<String>> {
        let existing = self.engine.list_containers(true).await?;
        let mut removed = Vec::new();

        for container in &existing {
            let stale = specs.iter().any(|spec| {
                container
                    .names
                    .iter()
                    .any(|name| name.trim_start_matches('/') == spec.name)
            });
            if !stale {
                continue;
            }
            if container.state.is_live() {
                self.engine.stop_container(&container.id).await?;
            }
            self.engine.remove_container(&container.id).await?;
            debug!(id = %container.id, names = ?container.names, "Removed stale container");
            removed.push(container.id.clone());
        }
        Ok(removed)
    }

    /// Whether a running container's name contains `name`. Engine errors
    /// read as "not running".
    pub async fn is_running(&self, name: &str) -> bool {
        match self.engine.list_containers(false).await {
            Ok(containers) => containers
                .iter()
                .any(|container| container.is_running() && container.name_contains(name)),
            Err(e) => {
                warn!(container = name, error = %e, "Could not list containers");
                false
            }
        }
    }
}
