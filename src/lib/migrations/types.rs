use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    Migrations,
    Seeds,
    Metadata,
}

impl MigrationPhase {
    /// Subcommand of the migration CLI for this phase.
    pub fn subcommand(self) -> [&'static str; 2] {
        match self {
            MigrationPhase::Migrations => ["migrate", "apply"],
            MigrationPhase::Seeds => ["seeds", "apply"],
            MigrationPhase::Metadata => ["metadata", "apply"],
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationPhase::Migrations => write!(f, "migrations"),
            MigrationPhase::Seeds => write!(f, "seeds"),
            MigrationPhase::Metadata => write!(f, "metadata"),
        }
    }
}

/// What one CLI invocation left behind.
#[derive(Debug, Clone)]
pub struct MigrationOutput {
    pub phase: MigrationPhase,
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// stdout followed by stderr.
    pub output: String,
}

impl MigrationOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to run {binary} for {phase}: {source}")]
    Spawn {
        binary: String,
        phase: MigrationPhase,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to apply {phase}:\n{output}")]
    Failed {
        phase: MigrationPhase,
        code: Option<i32>,
        output: String,
    },

    #[error("failed to launch hasura console: {0}")]
    Console(#[source] std::io::Error),
}

impl From<MigrationOutput> for MigrationError {
    fn from(output: MigrationOutput) -> Self {
        MigrationError::Failed {
            phase: output.phase,
            code: output.code,
            output: output.output,
        }
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;

/// Applies the project's schema to a running GraphQL engine, one method
/// per phase. Implementations return the output even on a non-zero exit;
/// callers decide what a failure means.
#[async_trait]
pub trait MigrationRunner: Send + Sync {
    async fn apply_migrations(&self) -> MigrationResult<MigrationOutput>;

    async fn apply_seeds(&self) -> MigrationResult<MigrationOutput>;

    async fn apply_metadata(&self) -> MigrationResult<MigrationOutput>;
}
