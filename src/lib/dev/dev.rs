use std::{future::Future, path::Path, sync::Arc};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::{
    signals::spawn_signal_listener,
    state::valid_state_transition,
    types::{DevError, DevResult, DevRun, RunState},
};
use crate::lib::{
    cleanup::types::{Cleanup, CleanupReport},
    config::{
        config::load_env_file,
        types::{CONSOLE_PORT, NhostConfig, RunContext},
    },
    engine::{docker::DockerEngine, images, types::Engine},
    health::health::HealthGate,
    lifecycle::types::Lifecycle,
    migrations::{
        hasura::HasuraCli,
        types::{MigrationError, MigrationOutput, MigrationPhase, MigrationResult, MigrationRunner},
    },
    ports::ports::occupied_ports,
    services::{
        specs::{build_specs, required_images, write_dockerfile},
        types::{API, HASURA, HBP},
    },
};

/// Races `fut` against the run's cancellation token. Cancellation wins ties,
/// so a step never starts once an interrupt has been seen.
async fn interruptible<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = DevResult<T>>,
) -> DevResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DevError::Interrupted),
        result = fut => result,
    }
}

fn has_seeds(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

impl DevRun {
    pub fn new(
        ctx: RunContext,
        config: NhostConfig,
        env_vars: Vec<String>,
        engine: Arc<dyn Engine>,
        migrations: Arc<dyn MigrationRunner>,
        cancel: CancellationToken,
    ) -> Self {
        let first_run = ctx.is_first_run();
        let cleanup = Cleanup::new(engine.clone(), vec![ctx.dockerfile_api()], CONSOLE_PORT);

        DevRun {
            ctx,
            config,
            env_vars,
            first_run,
            state: RunState::Init,
            specs: Vec::new(),
            lifecycle: Lifecycle::new(engine),
            health: HealthGate::default(),
            migrations,
            cleanup: Arc::new(cleanup),
            cancel,
        }
    }

    pub fn with_health_gate(mut self, health: HealthGate) -> Self {
        self.health = health;
        self
    }

    fn advance(&mut self, to: RunState) -> DevResult<()> {
        if !valid_state_transition(&self.state, &to) {
            return Err(DevError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        debug!(from = ?self.state, to = ?to, "Run state changed");
        self.state = to;
        Ok(())
    }

    /// Refuses to begin a step once interrupted or when the step would
    /// move the run somewhere it can't go from here.
    fn guard(&self, to: RunState) -> DevResult<()> {
        if self.cancel.is_cancelled() {
            return Err(DevError::Interrupted);
        }
        if !valid_state_transition(&self.state, &to) {
            return Err(DevError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        Ok(())
    }

    pub fn check_ports(&mut self) -> DevResult<()> {
        self.guard(RunState::PortsChecked)?;
        let occupied = occupied_ports(&self.config.required_ports());
        if !occupied.is_empty() {
            return Err(DevError::PortsInUse(occupied));
        }
        self.advance(RunState::PortsChecked)
    }

    pub fn build(&mut self) -> DevResult<()> {
        self.guard(RunState::SpecsBuilt)?;
        if self.first_run {
            warn!("first run takes longer, please be patient");
        }

        self.specs = build_specs(&self.ctx, &self.config, &self.env_vars)?;
        write_dockerfile(&self.ctx).map_err(|source| DevError::Artifact {
            path: self.ctx.dockerfile_api(),
            source,
        })?;
        self.advance(RunState::SpecsBuilt)
    }

    pub async fn ensure_images(&mut self) -> DevResult<()> {
        self.guard(RunState::ImagesReady)?;
        let cancel = self.cancel.clone();
        let engine = self.lifecycle.engine.clone();
        let required = required_images(&self.specs);

        let pulled = interruptible(&cancel, async {
            Ok::<_, DevError>(images::ensure_images(engine.as_ref(), &required).await?)
        })
        .await?;
        if !pulled.is_empty() {
            info!(pulled = ?pulled, "Missing images pulled");
        }
        self.advance(RunState::ImagesReady)
    }

    pub async fn start_containers(&mut self) -> DevResult<()> {
        self.guard(RunState::ContainersStarted)?;
        let cancel = self.cancel.clone();
        let specs = self.specs.clone();
        let lifecycle = &mut self.lifecycle;

        interruptible(&cancel, async {
            lifecycle.clear_stale(&specs).await?;
            lifecycle.start_all(specs.clone()).await?;
            Ok::<_, DevError>(())
        })
        .await?;
        self.advance(RunState::ContainersStarted)
    }

    pub async fn await_healthy(&mut self) -> DevResult<()> {
        self.guard(RunState::HealthChecked)?;
        info!("waiting for GraphQL engine to go up");
        let cancel = self.cancel.clone();
        let health = self.health.clone();
        let port = self.config.hasura_graphql_port;

        let healthy = interruptible(&cancel, async { Ok(health.wait_healthy(port).await) }).await?;
        if !healthy {
            return Err(DevError::Unhealthy);
        }
        self.advance(RunState::HealthChecked)
    }

    async fn apply_phase(
        &self,
        phase: MigrationPhase,
        fut: impl Future<Output = MigrationResult<MigrationOutput>>,
    ) -> DevResult<()> {
        info!(phase = %phase, "Applying");
        let output = interruptible(&self.cancel, async { Ok::<_, DevError>(fut.await?) }).await?;

        if !output.success() {
            error!(phase = %phase, code = ?output.code, "Migration CLI exited unsuccessfully");
            return Err(MigrationError::from(output).into());
        }
        debug!(phase = %phase, output = %output.output.trim_end(), "Applied");
        Ok(())
    }

    /// Migrations, then seeds on a first run when there are any, then
    /// metadata. Nothing already applied is rolled back on failure.
    pub async fn apply_migrations(&mut self) -> DevResult<()> {
        self.guard(RunState::MigrationsApplied)?;
        let runner = self.migrations.clone();

        self.apply_phase(MigrationPhase::Migrations, runner.apply_migrations())
            .await?;
        if self.first_run && has_seeds(&self.ctx.seeds_dir()) {
            self.apply_phase(MigrationPhase::Seeds, runner.apply_seeds())
                .await?;
        }
        self.apply_phase(MigrationPhase::Metadata, runner.apply_metadata())
            .await?;

        self.advance(RunState::MigrationsApplied)
    }

    /// Every step from the port check through migrations.
    pub async fn bring_up(&mut self) -> DevResult<()> {
        self.check_ports()?;
        self.build()?;
        self.ensure_images().await?;
        self.start_containers().await?;
        self.await_healthy().await?;
        self.apply_migrations().await
    }

    /// Addresses of the services that are actually up.
    pub async fn service_addresses(&self) -> Vec<String> {
        let candidates = [
            (
                HASURA,
                format!("GraphQL API: http://localhost:{}/v1/graphql", self.config.hasura_graphql_port),
            ),
            (
                HBP,
                format!("Auth & Storage: http://localhost:{}", self.config.hasura_backend_plus_port),
            ),
            (API, format!("Custom API: http://localhost:{}", self.config.api_port)),
        ];

        let mut addresses = Vec::new();
        for (name, address) in candidates {
            if self.lifecycle.is_running(name).await {
                addresses.push(address);
            }
        }
        addresses
    }

    /// Blocks until the operator presses Enter or a signal arrives.
    pub async fn serve<R: AsyncBufRead + Unpin>(&mut self, input: R) -> DevResult<RunState> {
        self.advance(RunState::ConsoleRunning)?;
        let outcome = wait_for_operator(input, &self.cancel).await;
        self.advance(outcome)?;
        Ok(outcome)
    }

    /// Tears the stack down. Safe to call from any state, any number of times.
    pub async fn rollback(&mut self, reason: &str) -> CleanupReport {
        if self.advance(RunState::RollingBack).is_err() {
            debug!(state = ?self.state, "Rollback requested outside a live run");
        }
        let report = self.cleanup.cleanup(reason).await;
        self.state = RunState::Terminated;
        report
    }
}

/// A line on `input` completes the run; a cancelled token interrupts it.
/// Once `input` is closed only the token can end the wait.
pub async fn wait_for_operator<R: AsyncBufRead + Unpin>(
    input: R,
    cancel: &CancellationToken,
) -> RunState {
    let mut lines = input.lines();

    tokio::select! {
        _ = cancel.cancelled() => RunState::Interrupted,
        line = lines.next_line() => match line {
            Ok(Some(_)) => RunState::Completed,
            Ok(None) | Err(_) => {
                debug!("stdin closed, waiting for a signal");
                cancel.cancelled().await;
                RunState::Interrupted
            }
        },
    }
}

/// Runs one `nhost dev` session and returns the process exit code.
pub async fn run(ctx: RunContext) -> i32 {
    let span = info_span!("dev", run_id = %ctx.run_id);
    execute(ctx).instrument(span).await
}

async fn prepare(ctx: &RunContext) -> DevResult<(NhostConfig, Vec<String>, DockerEngine)> {
    let mut config = NhostConfig::load(ctx)?;
    let env_vars = load_env_file(&ctx.env_file(&config))?;
    config.prepare_run();
    let engine = DockerEngine::connect().await?;
    Ok((config, env_vars, engine))
}

async fn execute(ctx: RunContext) -> i32 {
    let (config, env_vars, engine) = match prepare(&ctx).await {
        Ok(prepared) => prepared,
        Err(e) => {
            error!(error = %e, "Failed to prepare the local environment");
            return 1;
        }
    };

    let cancel = CancellationToken::new();
    let _signals = spawn_signal_listener(cancel.clone());
    let hasura = HasuraCli::new(&ctx, &config);
    let mut dev = DevRun::new(
        ctx,
        config,
        env_vars,
        Arc::new(engine),
        Arc::new(hasura.clone()),
        cancel,
    );

    if let Err(e) = dev.bring_up().await {
        error!(error = %e, "Failed to start the local environment");
        if !e.is_precondition() {
            dev.rollback(&e.to_string()).await;
        }
        return 1;
    }

    info!("Local Nhost backend is up!");
    for address in dev.service_addresses().await {
        println!("{address}");
    }

    // held until teardown; dropping the handle kills the console
    let _console = match hasura.launch_console(CONSOLE_PORT) {
        Ok(child) => {
            println!("Hasura Console: http://localhost:{CONSOLE_PORT}");
            Some(child)
        }
        Err(e) => {
            warn!(error = %e, "failed to launch hasura console");
            None
        }
    };

    println!("Press Enter or Ctrl + C to stop the environment");
    match dev.serve(BufReader::new(tokio::io::stdin())).await {
        Ok(RunState::Completed) => {
            let report = dev.rollback("stopped by operator").await;
            if report.is_clean() { 0 } else { 1 }
        }
        Ok(_) => {
            dev.rollback(&DevError::Interrupted.to_string()).await;
            1
        }
        Err(e) => {
            error!(error = %e, "Run state machine rejected a transition");
            dev.rollback(&e.to_string()).await;
            1
        }
    }
}
