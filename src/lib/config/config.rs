use std::{collections::HashSet, path::Path};

use rand::RngCore;
use tracing::{debug, info, warn};

use super::types::{CONSOLE_PORT, ConfigError, ConfigResult, NhostConfig, RunContext};

/// Length in bytes of the per-run JWT signing key before hex encoding.
const JWT_KEY_BYTES: usize = 128;
const ADMIN_SECRET_BYTES: usize = 32;

impl RunContext {
    /// Aborts early when the directory holds no Nhost project.
    pub fn ensure_project(&self) -> ConfigResult<()> {
        if !self.nhost_dir().is_dir() {
            return Err(ConfigError::ProjectNotFound(self.project_dir.clone()));
        }
        Ok(())
    }

    /// Creates `.nhost/` if absent. The directory itself outlives runs.
    pub fn ensure_marker_dir(&self) -> ConfigResult<()> {
        let path = self.dot_nhost();
        std::fs::create_dir_all(&path).map_err(|source| ConfigError::MarkerDir { path, source })
    }
}

impl NhostConfig {
    pub fn load(ctx: &RunContext) -> ConfigResult<Self> {
        let path = ctx.config_file();
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        let config = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        config.validate()?;

        debug!(path = %path.display(), "Loaded Nhost config");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let versions = [
            ("hasura_graphql_version", &self.hasura_graphql_version),
            ("hasura_backend_plus_version", &self.hasura_backend_plus_version),
            ("postgres_version", &self.postgres_version),
            ("minio_version", &self.minio_version),
            ("mc_version", &self.mc_version),
        ];
        for (key, value) in versions {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }

        let mut seen = HashSet::new();
        for (key, port) in self.named_ports() {
            if port == 0 {
                return Err(ConfigError::Invalid(format!("{key} must not be 0")));
            }
            if !seen.insert(port) {
                return Err(ConfigError::Invalid(format!(
                    "{key} reuses port {port}, every service needs its own port"
                )));
            }
        }

        Ok(())
    }

    fn named_ports(&self) -> [(&'static str, u16); 6] {
        [
            ("hasura_graphql_port", self.hasura_graphql_port),
            ("hasura_backend_plus_port", self.hasura_backend_plus_port),
            ("postgres_port", self.postgres_port),
            ("minio_port", self.minio_port),
            ("api_port", self.api_port),
            ("console_port", CONSOLE_PORT),
        ]
    }

    /// Host ports that must be free before anything is created.
    pub fn required_ports(&self) -> Vec<u16> {
        self.named_ports().iter().map(|(_, port)| *port).collect()
    }

    /// Injects the per-run secrets: a fresh JWT key every time, and an
    /// admin secret only when the project didn't set one.
    pub fn prepare_run(&mut self) {
        self.graphql_jwt_key = Some(generate_random_key(JWT_KEY_BYTES));

        if self.admin_secret().is_none() {
            warn!("hasura_graphql_admin_secret not set, generating one for this run");
            self.hasura_graphql_admin_secret = Some(generate_random_key(ADMIN_SECRET_BYTES));
        }
    }

    pub fn admin_secret(&self) -> Option<&str> {
        self.hasura_graphql_admin_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
    }

    pub fn graphql_image(&self) -> String {
        format!("{}:{}", self.hasura_graphql_engine, self.hasura_graphql_version)
    }

    pub fn graphql_endpoint(&self) -> String {
        format!("http://localhost:{}", self.hasura_graphql_port)
    }

    /// Renders a scalar from the untyped remainder of the file.
    pub fn extra_value(&self, key: &str) -> Option<String> {
        match self.extra.get(key)? {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Hex encoded random key of `bytes` bytes.
pub fn generate_random_key(bytes: usize) -> String {
    let mut key = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut key);
    hex::encode(key)
}

/// Reads `KEY=VALUE` lines. Lines without `=` are skipped, everything else
/// is kept verbatim so values may carry further `=` signs.
pub fn parse_env_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .filter(|line| line.contains('='))
        .map(str::to_string)
        .collect()
}

pub fn load_env_file(path: &Path) -> ConfigResult<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;
    let vars = parse_env_file(&contents);
    info!(path = %path.display(), count = vars.len(), "Loaded env file");
    Ok(vars)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
hasura_graphql_version: v1.3.3
hasura_graphql_port: 8080
hasura_graphql_admin_secret: 123456
hasura_backend_plus_version: v2.2.0
hasura_backend_plus_port: 9001
postgres_version: 12.6
postgres_port: 5432
postgres_user: postgres
postgres_password: postgres
minio_port: 9000
api_port: 4000
env_file: .env.development
provider_success_redirect: http://localhost:3000
provider_failure_redirect: http://localhost:3000/login-fail
github_enable: true
github_client_id: abc
google_client_secret: 42
"#;

    pub(crate) fn sample_config() -> NhostConfig {
        NhostConfig::from_yaml(SAMPLE).unwrap()
    }

    #[test]
    fn parses_required_and_defaulted_keys() {
        let config = sample_config();
        assert_eq!(config.hasura_graphql_port, 8080);
        assert_eq!(config.admin_secret(), Some("123456"));
        assert_eq!(config.hasura_graphql_engine, "hasura/graphql-engine");
        assert_eq!(config.minio_version, "latest");
        assert_eq!(config.graphql_image(), "hasura/graphql-engine:v1.3.3");
        assert!(config.graphql_jwt_key.is_none());
    }

    #[test]
    fn extra_scalars_render_as_strings() {
        let config = sample_config();
        assert_eq!(config.extra_value("github_enable").as_deref(), Some("true"));
        assert_eq!(config.extra_value("github_client_id").as_deref(), Some("abc"));
        assert_eq!(config.extra_value("google_client_secret").as_deref(), Some("42"));
        assert_eq!(config.extra_value("facebook_enable"), None);
    }

    #[test]
    fn missing_required_key_fails_to_parse() {
        let raw = SAMPLE.replace("minio_port: 9000\n", "");
        assert!(NhostConfig::from_yaml(&raw).is_err());
    }

    #[test]
    fn duplicate_ports_are_rejected() {
        let mut config = sample_config();
        config.api_port = config.minio_port;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("api_port"));

        let mut config = sample_config();
        config.hasura_graphql_port = CONSOLE_PORT;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_version_is_rejected() {
        let mut config = sample_config();
        config.postgres_version = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn prepare_run_regenerates_jwt_key_and_keeps_admin_secret() {
        let mut config = sample_config();
        config.prepare_run();
        let first = config.graphql_jwt_key.clone().unwrap();
        assert_eq!(first.len(), JWT_KEY_BYTES * 2);

        config.prepare_run();
        assert_ne!(config.graphql_jwt_key.as_deref(), Some(first.as_str()));
        assert_eq!(config.admin_secret(), Some("123456"));
    }

    #[test]
    fn prepare_run_generates_missing_admin_secret() {
        let mut config = sample_config();
        config.hasura_graphql_admin_secret = None;
        config.prepare_run();
        assert_eq!(config.admin_secret().map(str::len), Some(ADMIN_SECRET_BYTES * 2));
    }

    #[test]
    fn env_file_skips_lines_without_equals() {
        assert_eq!(
            parse_env_file("A=1\nBAD_LINE\nB=2=3"),
            vec!["A=1".to_string(), "B=2=3".to_string()]
        );
        assert!(parse_env_file("\n\n").is_empty());
    }

    #[test]
    fn missing_env_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.development");
        let err = load_env_file(&path).unwrap_err();
        assert!(err.to_string().contains(".env.development"));
    }

    #[test]
    fn project_precondition_and_marker_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::new(dir.path());
        assert!(matches!(ctx.ensure_project(), Err(ConfigError::ProjectNotFound(_))));

        std::fs::create_dir(ctx.nhost_dir()).unwrap();
        ctx.ensure_project().unwrap();
        ctx.ensure_marker_dir().unwrap();
        ctx.ensure_marker_dir().unwrap();
        assert!(ctx.dot_nhost().is_dir());
        assert!(ctx.is_first_run());
    }

    #[test]
    fn relative_env_file_resolves_against_project() {
        let ctx = RunContext::new("/work/app");
        let config = sample_config();
        assert_eq!(
            ctx.env_file(&config),
            std::path::PathBuf::from("/work/app/.env.development")
        );
    }
}
