//! Shutdown signal handling.

use tokio::signal;
use tracing::{info, warn};

/// Resolves on SIGINT or SIGTERM (Ctrl+C elsewhere).
///
/// If the Unix handlers cannot be installed the daemon still stops on
/// Ctrl+C.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{SignalKind, signal};

        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed to install signal handlers, falling back to ctrl-c");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;

    info!("received shutdown signal");
}

async fn wait_for_ctrl_c() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed");
        std::future::pending::<()>().await;
    }
}
