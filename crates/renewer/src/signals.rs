//! OS signal handling for graceful shutdown.

use std::io;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Signal that requested shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
}

/// Wait for SIGINT or SIGTERM
pub async fn wait_for_shutdown_signal() -> io::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok(ShutdownSignal::Interrupt)
            }
            _ = terminate.recv() => Ok(ShutdownSignal::Terminate),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(ShutdownSignal::Interrupt)
    }
}

/// Cancel `shutdown` when the first shutdown signal arrives.
///
/// If the handlers cannot be installed the token is left alone.
pub fn cancel_on_signal(shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(signal) => {
                info!(signal = ?signal, "Received shutdown signal");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "Failed to install shutdown signal handlers"),
        }
    })
}
