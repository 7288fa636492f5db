use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Cancels `cancel` on the first SIGINT or SIGTERM. The main flow notices
/// at its next suspension point and runs the rollback itself. A second
/// signal while that is still going exits the process immediately.
pub fn spawn_signal_listener(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut received = 0u32;
        loop {
            match shutdown_signal().await {
                Ok(signal) => {
                    received += 1;
                    if escalate(received) {
                        error!(signal, "Received second shutdown signal, exiting without cleanup");
                        std::process::exit(1);
                    }
                    warn!(signal, "Received shutdown signal");
                    cancel.cancel();
                }
                Err(e) => {
                    warn!(error = %e, "Could not listen for shutdown signals");
                    return;
                }
            }
        }
    })
}

fn escalate(received: u32) -> bool {
    received > 1
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_a_repeated_signal_escalates() {
        assert!(!escalate(1));
        assert!(escalate(2));
        assert!(escalate(3));
    }
}
