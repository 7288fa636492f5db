use std::{fs::File, path::PathBuf, sync::Mutex};

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::lib::{config::types::RunContext, dev::dev};

mod lib {
    pub mod cleanup;
    pub mod config;
    pub mod dev;
    pub mod engine;
    pub mod health;
    pub mod lifecycle;
    pub mod migrations;
    pub mod ports;
    pub mod services;
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn run_context() -> anyhow::Result<RunContext> {
    let project_dir = match std::env::var_os("NHOST_PROJECT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir()?,
    };

    let mut ctx = RunContext::new(project_dir);
    ctx.verbose = env_flag("NHOST_VERBOSE");
    if let Some(cli) = std::env::var_os("NHOST_HASURA_CLI") {
        ctx.hasura_cli = PathBuf::from(cli);
    }
    Ok(ctx)
}

/// Stdout plus a plain-text copy in `.nhost/nhost.log`, truncated per run.
fn init_logging(ctx: &RunContext) {
    let default_level = if ctx.verbose { "nhost_dev=debug" } else { "nhost_dev=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    let log_file = File::create(ctx.log_file()).ok();
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    let ctx = run_context()?;
    ctx.ensure_project()?;
    ctx.ensure_marker_dir()?;
    init_logging(&ctx);

    if let Err(e) = dotenv {
        warn!("No .env file loaded: {}", e);
    }
    info!(project = %ctx.project_dir.display(), "Starting local Nhost environment");

    // stdin is read on a blocking thread the runtime would otherwise wait on
    std::process::exit(dev::run(ctx).await)
}
