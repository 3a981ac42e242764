use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Returns a token cancelled on SIGINT or SIGTERM. The queue service
/// watches it and writes a final checkpoint before exiting.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();

    let trigger = token.clone();
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupt received, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, shutting down");
            }
        }

        trigger.cancel();
    });

    token
}
