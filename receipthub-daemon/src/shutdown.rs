use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

use crate::error::{io_err, DaemonError};

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns a `CancellationToken` that is cancelled when either signal is
/// received. Must be called from inside the runtime.
pub fn install_shutdown_handler() -> Result<CancellationToken, DaemonError> {
    let mut sigterm = signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(|e| io_err("SIGINT handler", e))?;

    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down daemon");
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down daemon");
            }
            _ = token_clone.cancelled() => return,
        }
        token_clone.cancel();
    });

    Ok(token)
}
