use std::collections::HashMap;

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{
        Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
        StartContainerOptions, StopContainerOptions,
    },
    errors::Error as BollardError,
    image::{CreateImageOptions, ListImagesOptions},
    models::{HostConfig, Mount, MountTypeEnum, PortBinding, RestartPolicy, RestartPolicyNameEnum},
};
use futures_util::stream::StreamExt;
use tracing::{debug, info};

use super::types::{
    ContainerHandle, ContainerState, Engine, EngineContainer, EngineError, EngineImage,
    EngineResult, StopOutcome,
};
use crate::lib::services::types::{self, ContainerSpec};

/// Docker engine reached through its management API.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    client: Docker,
}

impl DockerEngine {
    /// Connects using `DOCKER_HOST` or the platform default socket and
    /// checks the daemon answers.
    pub async fn connect() -> EngineResult<Self> {
        let client = Docker::connect_with_local_defaults().map_err(EngineError::Connect)?;
        client.ping().await.map_err(EngineError::Connect)?;
        Ok(DockerEngine { client })
    }
}

fn status_code(err: &BollardError) -> Option<u16> {
    match err {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn container_state(state: Option<&str>) -> ContainerState {
    match state {
        Some("created") => ContainerState::Created,
        Some("running") => ContainerState::Running,
        Some("restarting") => ContainerState::Restarting,
        Some("paused") => ContainerState::Paused,
        Some("exited") => ContainerState::Exited,
        Some("dead") => ContainerState::Dead,
        _ => ContainerState::Unknown,
    }
}

fn restart_policy(policy: types::RestartPolicy) -> RestartPolicy {
    let name = match policy {
        types::RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
        types::RestartPolicy::No => RestartPolicyNameEnum::NO,
    };
    RestartPolicy {
        name: Some(name),
        maximum_retry_count: None,
    }
}

/// Translates a spec into the engine's create-container body.
pub fn container_config(spec: &ContainerSpec) -> Config<String> {
    let exposed_port = spec.exposed_port.map(|port| format!("{port}/tcp"));

    let port_bindings = match (&exposed_port, spec.host_port) {
        (Some(container_port), Some(host_port)) => Some(HashMap::from([(
            container_port.clone(),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(host_port.to_string()),
            }]),
        )])),
        _ => None,
    };

    let mounts: Vec<Mount> = spec
        .mounts
        .iter()
        .map(|mount| Mount {
            source: Some(mount.source.to_string_lossy().into_owned()),
            target: Some(mount.target.clone()),
            typ: Some(MountTypeEnum::BIND),
            ..Default::default()
        })
        .collect();

    let host_config = HostConfig {
        restart_policy: Some(restart_policy(spec.restart_policy)),
        port_bindings,
        mounts: (!mounts.is_empty()).then_some(mounts),
        links: (!spec.links.is_empty())
            .then(|| spec.links.iter().map(ToString::to_string).collect()),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        env: Some(spec.env.clone()),
        exposed_ports: exposed_port.map(|port| HashMap::from([(port, HashMap::new())])),
        entrypoint: spec.entrypoint.clone(),
        cmd: spec.cmd.clone(),
        working_dir: spec.working_dir.clone(),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn list_images(&self) -> EngineResult<Vec<EngineImage>> {
        debug!("Fetching available container images");
        let images = self
            .client
            .list_images(Some(ListImagesOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| EngineError::request("list", "images", e))?;

        Ok(images
            .into_iter()
            .map(|image| EngineImage {
                repo_tags: image.repo_tags,
            })
            .collect())
    }

    async fn pull_image(&self, image: &str) -> EngineResult<()> {
        info!(image, "Pulling container image");

        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(msg) = stream.next().await {
            match msg {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!(image, status = %status, "Pull progress");
                    }
                }
                Err(e) => {
                    return Err(EngineError::Pull {
                        image: image.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(image, "Image pulled");
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> EngineResult<Vec<EngineContainer>> {
        let containers = self
            .client
            .list_containers(Some(ListContainersOptions::<String> {
                all,
                ..Default::default()
            }))
            .await
            .map_err(|e| EngineError::request("list", "containers", e))?;

        Ok(containers
            .into_iter()
            .map(|container| EngineContainer {
                id: container.id.unwrap_or_default(),
                names: container.names.unwrap_or_default(),
                state: container_state(container.state.as_deref()),
            })
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<ContainerHandle> {
        let options = Some(CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        });

        let response = self
            .client
            .create_container(options, container_config(spec))
            .await
            .map_err(|e| EngineError::request("create container", &spec.name, e))?;

        for warning in &response.warnings {
            debug!(container = %spec.name, warning = %warning, "Engine warning on create");
        }

        Ok(ContainerHandle {
            id: response.id,
            name: spec.name.clone(),
        })
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::request("start container", id, e))
    }

    async fn stop_container(&self, id: &str) -> EngineResult<StopOutcome> {
        match self
            .client
            .stop_container(id, None::<StopContainerOptions>)
            .await
        {
            Ok(_) => Ok(StopOutcome::Stopped),
            Err(e) => match status_code(&e) {
                Some(304) => Ok(StopOutcome::AlreadyStopped),
                Some(404) => Ok(StopOutcome::NotFound),
                _ => Err(EngineError::request("stop container", id, e)),
            },
        }
    }

    async fn remove_container(&self, id: &str) -> EngineResult<()> {
        match self
            .client
            .remove_container(id, None::<RemoveContainerOptions>)
            .await
        {
            Err(e) if status_code(&e) != Some(404) => {
                Err(EngineError::request("remove container", id, e))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::services::types::{BindMount, Link};

    fn spec() -> ContainerSpec {
        let mut spec = ContainerSpec::new("nhost_hasura", "hasura/graphql-engine:v1.3.3".into());
        spec.env = vec!["A=1".to_string()];
        spec.exposed_port = Some(8080);
        spec.host_port = Some(18080);
        spec.mounts = vec![BindMount {
            source: "/tmp/data".into(),
            target: "/data".to_string(),
        }];
        spec.links = vec![Link::new("nhost_postgres", "nhost-postgres")];
        spec
    }

    #[test]
    fn config_publishes_on_loopback() {
        let config = container_config(&spec());
        let host = config.host_config.unwrap();
        let bindings = host.port_bindings.unwrap();
        let binding = &bindings["8080/tcp"].as_ref().unwrap()[0];
        assert_eq!(binding.host_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(binding.host_port.as_deref(), Some("18080"));
        assert!(config.exposed_ports.unwrap().contains_key("8080/tcp"));
    }

    #[test]
    fn config_carries_links_mounts_and_restart_policy() {
        let config = container_config(&spec());
        let host = config.host_config.unwrap();
        assert_eq!(host.links.unwrap(), vec!["nhost_postgres:nhost-postgres".to_string()]);

        let mount = &host.mounts.unwrap()[0];
        assert_eq!(mount.typ, Some(MountTypeEnum::BIND));
        assert_eq!(mount.source.as_deref(), Some("/tmp/data"));
        assert_eq!(
            host.restart_policy.unwrap().name,
            Some(RestartPolicyNameEnum::ALWAYS)
        );
        assert_eq!(config.env.unwrap(), vec!["A=1".to_string()]);
    }

    #[test]
    fn exposed_port_without_binding_is_not_published() {
        let mut spec = spec();
        spec.host_port = None;
        spec.links.clear();
        spec.mounts.clear();
        let config = container_config(&spec);
        let host = config.host_config.unwrap();
        assert!(host.port_bindings.is_none());
        assert!(host.links.is_none());
        assert!(host.mounts.is_none());
        assert!(config.exposed_ports.is_some());
    }

    #[test]
    fn restarting_and_paused_containers_are_live() {
        assert!(container_state(Some("running")).is_live());
        assert!(container_state(Some("restarting")).is_live());
        assert!(container_state(Some("paused")).is_live());
        assert!(!container_state(Some("exited")).is_live());
        assert!(!container_state(Some("created")).is_live());
        assert!(!container_state(Some("dead")).is_live());
        assert_eq!(container_state(None), ContainerState::Unknown);
    }

    #[test]
    fn stop_status_codes_are_classified() {
        let not_modified = BollardError::DockerResponseServerError {
            status_code: 304,
            message: String::new(),
        };
        assert_eq!(status_code(&not_modified), Some(304));
    }
}
