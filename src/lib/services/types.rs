use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every container this tool owns carries this prefix; cleanup finds them by it.
pub const CONTAINER_PREFIX: &str = "nhost_";

pub const POSTGRES: &str = "nhost_postgres";
pub const MINIO: &str = "nhost_minio";
pub const MINIO_CLIENT: &str = "nhost_mc";
pub const HASURA: &str = "nhost_hasura";
pub const HBP: &str = "nhost_hbp";
pub const API: &str = "nhost_api";

/// Base image the custom API runs on; also pinned by the generated Dockerfile.
pub const API_BASE_IMAGE: &str = "nhost/nodeapi:v0.2.7";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartPolicy {
    Always,
    No,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub source: PathBuf,
    pub target: String,
}

/// Reachability of another container under a fixed alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub container: String,
    pub alias: String,
}

impl Link {
    pub fn new(container: &str, alias: &str) -> Self {
        Link {
            container: container.to_string(),
            alias: alias.to_string(),
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.container, self.alias)
    }
}

/// Fully resolved description of one container, prior to creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// `KEY=VALUE` entries; for repeated keys the last one wins.
    pub env: Vec<String>,
    pub exposed_port: Option<u16>,
    /// Published on 127.0.0.1, mapped onto `exposed_port`.
    pub host_port: Option<u16>,
    pub mounts: Vec<BindMount>,
    pub links: Vec<Link>,
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub working_dir: Option<String>,
    pub restart_policy: RestartPolicy,
}

impl ContainerSpec {
    pub fn new(name: &str, image: String) -> Self {
        ContainerSpec {
            name: name.to_string(),
            image,
            env: Vec::new(),
            exposed_port: None,
            host_port: None,
            mounts: Vec::new(),
            links: Vec::new(),
            entrypoint: None,
            cmd: None,
            working_dir: None,
            restart_policy: RestartPolicy::Always,
        }
    }

    /// Effective value of `key` as the engine will see it.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.iter().rev().find_map(|entry| {
            let (k, v) = entry.split_once('=')?;
            (k == key).then_some(v)
        })
    }
}

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("failed to create mount directory {path}: {source}")]
    MountDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type SpecResult<T> = Result<T, SpecError>;
