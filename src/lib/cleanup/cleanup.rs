use std::{ffi::OsStr, io::ErrorKind, path::PathBuf, sync::Arc};

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    sockets::port_owners,
    types::{Cleanup, CleanupReport},
};
use crate::lib::{
    engine::types::{Engine, StopOutcome},
    services::types::CONTAINER_PREFIX,
};

impl Cleanup {
    pub fn new(engine: Arc<dyn Engine>, artifacts: Vec<PathBuf>, console_port: u16) -> Self {
        Cleanup {
            engine,
            artifacts,
            console_port,
            passes: Mutex::new(0),
        }
    }

    /// Runs every teardown step regardless of how the previous one went.
    pub async fn cleanup(&self, reason: &str) -> CleanupReport {
        let mut passes = self.passes.lock().await;
        *passes += 1;

        let mut report = CleanupReport {
            pass: *passes,
            ..Default::default()
        };
        warn!(reason, pass = report.pass, "Cleanup/rollback process initiated");

        self.stop_services(&mut report).await;
        self.kill_console(&mut report).await;
        self.remove_artifacts(&mut report).await;

        if report.is_clean() {
            info!(
                stopped = report.stopped.len(),
                already_stopped = report.already_stopped.len(),
                "Cleanup complete"
            );
        } else {
            warn!(failures = ?report.failures, "Cleanup finished with failures");
        }
        report
    }

    async fn stop_services(&self, report: &mut CleanupReport) {
        let containers = match self.engine.list_containers(true).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(error = %e, "Failed to shutdown running Nhost services");
                report.failures.push(e.to_string());
                return;
            }
        };

        let ours = containers.into_iter().filter(|container| {
            container
                .names
                .iter()
                .any(|name| name.trim_start_matches('/').starts_with(CONTAINER_PREFIX))
        });

        for container in ours {
            let name = container
                .names
                .first()
                .map(|name| name.trim_start_matches('/').to_string())
                .unwrap_or_else(|| container.id.clone());

            if !container.state.is_live() {
                debug!(container = %name, "Already stopped");
                report.already_stopped.push(name);
                continue;
            }

            match self.engine.stop_container(&container.id).await {
                Ok(StopOutcome::Stopped) => {
                    info!(container = %name, "Container stopped");
                    report.stopped.push(name);
                }
                Ok(StopOutcome::AlreadyStopped | StopOutcome::NotFound) => {
                    report.already_stopped.push(name);
                }
                Err(e) => {
                    warn!(container = %name, error = %e, "Failed to stop container");
                    report.failures.push(e.to_string());
                }
            }
        }
    }

    async fn kill_console(&self, report: &mut CleanupReport) {
        let port = self.console_port;
        match tokio::task::spawn_blocking(move || kill_port_holders(port)).await {
            Ok(killed) => {
                if killed > 0 {
                    info!(port, killed, "Processes holding the console port terminated");
                }
                report.port_holders_killed = killed;
            }
            Err(e) => {
                warn!(error = %e, "Failed to kill hasura console session");
                report.failures.push(format!("failed to kill hasura console session: {e}"));
            }
        }
    }

    async fn remove_artifacts(&self, report: &mut CleanupReport) {
        for path in &self.artifacts {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed generated file");
                    report.removed_artifacts.push(path.clone());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove generated file");
                    report
                        .failures
                        .push(format!("failed to remove {}: {e}", path.display()));
                }
            }
        }
    }
}

/// Whether `cmd` is a console session serving on `port`.
pub fn is_console_command<S: AsRef<OsStr>>(cmd: &[S], port: u16) -> bool {
    let args: Vec<&str> = cmd.iter().filter_map(|arg| arg.as_ref().to_str()).collect();
    let port = port.to_string();
    let inline = format!("--console-port={port}");

    args.contains(&"console")
        && args.iter().enumerate().any(|(i, arg)| {
            *arg == inline || (*arg == "--console-port" && args.get(i + 1) == Some(&port.as_str()))
        })
}

/// Kills whatever holds `port`: every process owning a listening socket
/// on it, plus console sessions started for it that haven't bound it yet.
/// This process is never a target.
fn kill_port_holders(port: u16) -> usize {
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
    );
    let own_pid = sysinfo::get_current_pid().ok();
    let owners = port_owners(port);

    system
        .processes()
        .values()
        .filter(|process| Some(process.pid()) != own_pid)
        .filter(|process| {
            owners.contains(&process.pid().as_u32()) || is_console_command(process.cmd(), port)
        })
        .filter(|process| process.kill())
        .count()
}
