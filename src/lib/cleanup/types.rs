use std::{path::PathBuf, sync::Arc};

use tokio::sync::Mutex;

use crate::lib::engine::types::Engine;

/// Tears the stack down after a failure, an interrupt or a normal exit.
///
/// Holds no record of what was started: each pass asks the engine which
/// `nhost_` containers exist. Passes are serialized, so a signal arriving
/// during a rollback waits for it and then finds nothing left to do.
pub struct Cleanup {
    pub engine: Arc<dyn Engine>,
    pub artifacts: Vec<PathBuf>,
    pub console_port: u16,
    pub passes: Mutex<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub pass: u32,
    pub stopped: Vec<String>,
    pub already_stopped: Vec<String>,
    /// Processes killed for holding the console port.
    pub port_holders_killed: usize,
    pub removed_artifacts: Vec<PathBuf>,
    /// One line per step that failed; later steps still ran.
    pub failures: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
