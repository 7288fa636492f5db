use std::{path::PathBuf, process::Stdio};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use super::types::{MigrationError, MigrationOutput, MigrationPhase, MigrationResult, MigrationRunner};
use crate::lib::config::types::{NhostConfig, RunContext};

/// The `hasura` CLI pointed at the local engine, run from `nhost/`.
#[derive(Debug, Clone)]
pub struct HasuraCli {
    pub binary: PathBuf,
    pub workdir: PathBuf,
    pub endpoint: String,
    pub admin_secret: String,
}

impl HasuraCli {
    pub fn new(ctx: &RunContext, config: &NhostConfig) -> Self {
        HasuraCli {
            binary: ctx.hasura_cli.clone(),
            workdir: ctx.nhost_dir(),
            endpoint: config.graphql_endpoint(),
            admin_secret: config.admin_secret().unwrap_or_default().to_string(),
        }
    }

    fn connection_args(&self) -> [&str; 4] {
        ["--endpoint", &self.endpoint, "--admin-secret", &self.admin_secret]
    }

    pub fn phase_args(&self, phase: MigrationPhase) -> Vec<String> {
        phase
            .subcommand()
            .into_iter()
            .chain(self.connection_args())
            .chain(["--skip-update-check"])
            .map(str::to_string)
            .collect()
    }

    async fn run(&self, phase: MigrationPhase) -> MigrationResult<MigrationOutput> {
        debug!(phase = %phase, binary = %self.binary.display(), "Applying");

        let output = Command::new(&self.binary)
            .args(self.phase_args(phase))
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| MigrationError::Spawn {
                binary: self.binary.display().to_string(),
                phase,
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(MigrationOutput {
            phase,
            code: output.status.code(),
            output: combined,
        })
    }

    /// Starts `hasura console` in the background. The child is killed if
    /// its handle is dropped.
    pub fn launch_console(&self, console_port: u16) -> MigrationResult<Child> {
        let child = Command::new(&self.binary)
            .arg("console")
            .args(self.connection_args())
            .arg("--console-port")
            .arg(console_port.to_string())
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(MigrationError::Console)?;

        info!(port = console_port, pid = ?child.id(), "Hasura console launched");
        Ok(child)
    }
}

#[async_trait]
impl MigrationRunner for HasuraCli {
    async fn apply_migrations(&self) -> MigrationResult<MigrationOutput> {
        self.run(MigrationPhase::Migrations).await
    }

    async fn apply_seeds(&self) -> MigrationResult<MigrationOutput> {
        self.run(MigrationPhase::Seeds).await
    }

    async fn apply_metadata(&self) -> MigrationResult<MigrationOutput> {
        self.run(MigrationPhase::Metadata).await
    }
}
