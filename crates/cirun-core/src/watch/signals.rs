use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use cirun_model::ShutdownCause;

use crate::ShutdownHandle;

/// Wait for SIGTERM, SIGINT or SIGQUIT and return its name.
#[cfg(unix)]
pub async fn wait_for_termination_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
        _ = sigquit.recv() => Ok("SIGQUIT"),
    }
}

#[cfg(not(unix))]
pub async fn wait_for_termination_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("SIGINT")
}

/// Forward the first termination signal to the orchestrator as a graceful shutdown.
pub fn spawn_signal_listener(shutdown: ShutdownHandle, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            sig = wait_for_termination_signal() => match sig {
                Ok(name) => shutdown.request(ShutdownCause::reason(name)),
                Err(e) => warn!("failed to install signal handlers: {e}"),
            },
        }
    })
}
