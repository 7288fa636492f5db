use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Deserializer, de};
use thiserror::Error;

/// Port the Hasura console listens on. Reserved alongside the service ports.
pub const CONSOLE_PORT: u16 = 9695;

pub const DEFAULT_GRAPHQL_ENGINE: &str = "hasura/graphql-engine";
pub const DEFAULT_ENV_FILE: &str = ".env.development";

/// Typed view of `nhost/config.yaml`.
///
/// Required keys are plain fields; anything the file carries beyond them
/// (social auth credentials, mostly) lands in `extra` and is looked up by
/// name when the auth container is assembled.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NhostConfig {
    #[serde(deserialize_with = "scalar")]
    pub hasura_graphql_version: String,
    pub hasura_graphql_port: u16,
    #[serde(default, deserialize_with = "optional_scalar")]
    pub hasura_graphql_admin_secret: Option<String>,
    #[serde(default = "default_graphql_engine")]
    pub hasura_graphql_engine: String,

    #[serde(deserialize_with = "scalar")]
    pub hasura_backend_plus_version: String,
    pub hasura_backend_plus_port: u16,

    #[serde(deserialize_with = "scalar")]
    pub postgres_version: String,
    pub postgres_port: u16,
    #[serde(deserialize_with = "scalar")]
    pub postgres_user: String,
    #[serde(deserialize_with = "scalar")]
    pub postgres_password: String,

    pub minio_port: u16,
    #[serde(default = "default_latest", deserialize_with = "scalar")]
    pub minio_version: String,
    #[serde(default = "default_latest", deserialize_with = "scalar")]
    pub mc_version: String,
    #[serde(default = "default_minio_access_key", deserialize_with = "scalar")]
    pub minio_access_key: String,
    #[serde(default = "default_minio_secret_key", deserialize_with = "scalar")]
    pub minio_secret_key: String,

    pub api_port: u16,

    #[serde(default = "default_env_file")]
    pub env_file: String,
    #[serde(default = "default_webhook_secret", deserialize_with = "scalar")]
    pub webhook_secret: String,
    #[serde(default)]
    pub provider_success_redirect: Option<String>,
    #[serde(default)]
    pub provider_failure_redirect: Option<String>,

    /// Regenerated on every run, never read from disk.
    #[serde(skip)]
    pub graphql_jwt_key: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// YAML happily types `12.6` or `123456` as numbers; versions and secrets
/// are strings to us no matter how they were written.
fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(de::Error::custom(format!(
            "expected a string or number, found {other:?}"
        ))),
    }
}

fn optional_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::Null => Ok(None),
        value => scalar(value).map(Some).map_err(de::Error::custom),
    }
}

fn default_graphql_engine() -> String {
    DEFAULT_GRAPHQL_ENGINE.to_string()
}

fn default_latest() -> String {
    "latest".to_string()
}

fn default_minio_access_key() -> String {
    "minioaccesskey123123".to_string()
}

fn default_minio_secret_key() -> String {
    "miniosecretkey123123".to_string()
}

fn default_env_file() -> String {
    DEFAULT_ENV_FILE.to_string()
}

fn default_webhook_secret() -> String {
    "devnhostwebhooksecret".to_string()
}

/// Paths and flags for one `nhost dev` invocation.
///
/// Built once in `main` and handed to every component, so nothing below
/// the entry point reads the working directory or environment on its own.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: uuid::Uuid,
    pub project_dir: PathBuf,
    pub verbose: bool,
    pub hasura_cli: PathBuf,
}

impl RunContext {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        RunContext {
            run_id: uuid::Uuid::new_v4(),
            project_dir: project_dir.into(),
            verbose: false,
            hasura_cli: PathBuf::from("hasura"),
        }
    }

    /// `nhost/`, the user's project sources (config, migrations, seeds).
    pub fn nhost_dir(&self) -> PathBuf {
        self.project_dir.join("nhost")
    }

    /// `.nhost/`, the run marker directory for generated artifacts and volumes.
    pub fn dot_nhost(&self) -> PathBuf {
        self.project_dir.join(".nhost")
    }

    pub fn config_file(&self) -> PathBuf {
        self.nhost_dir().join("config.yaml")
    }

    pub fn seeds_dir(&self) -> PathBuf {
        self.nhost_dir().join("seeds")
    }

    pub fn custom_dir(&self) -> PathBuf {
        self.nhost_dir().join("custom")
    }

    pub fn api_dir(&self) -> PathBuf {
        self.project_dir.join("api")
    }

    pub fn db_data_dir(&self) -> PathBuf {
        self.dot_nhost().join("db_data")
    }

    pub fn minio_data_dir(&self) -> PathBuf {
        self.dot_nhost().join("minio").join("data")
    }

    pub fn minio_config_dir(&self) -> PathBuf {
        self.dot_nhost().join("minio").join("config")
    }

    pub fn dockerfile_api(&self) -> PathBuf {
        self.dot_nhost().join("Dockerfile-api")
    }

    pub fn log_file(&self) -> PathBuf {
        self.dot_nhost().join("nhost.log")
    }

    pub fn env_file(&self, config: &NhostConfig) -> PathBuf {
        let path = Path::new(&config.env_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    /// The database volume is created on first start, so its absence means
    /// nothing has ever been provisioned here.
    pub fn is_first_run(&self) -> bool {
        !self.db_data_dir().exists()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("project not found in this directory\nto initialize a project, run 'nhost' or 'nhost init'")]
    ProjectNotFound(PathBuf),

    #[error("couldn't read Nhost config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("couldn't parse Nhost config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid Nhost config: {0}")]
    Invalid(String),

    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("couldn't initialize nhost specific directory {path}: {source}")]
    MarkerDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;
