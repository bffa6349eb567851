//! OS signal handling.

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::lifecycle::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    Reload,
}

/// Listen for SIGINT, SIGTERM and SIGHUP in a background task.
///
/// Termination signals trigger `shutdown`; SIGHUP is forwarded as
/// [`SignalEvent::Reload`]. Fails only if the handlers cannot be installed.
pub fn spawn_signal_listener(shutdown: Shutdown) -> std::io::Result<mpsc::UnboundedReceiver<SignalEvent>> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut stop = shutdown.subscribe();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = hangup.recv() => {
                    tracing::info!("SIGHUP received, reloading boot file");
                    if tx.send(SignalEvent::Reload).is_err() {
                        break;
                    }
                }
                _ = terminate.recv() => {
                    tracing::info!("SIGTERM received");
                    shutdown.trigger();
                    break;
                }
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                    } else {
                        tracing::info!("Shutdown signal received");
                    }
                    shutdown.trigger();
                    break;
                }
                _ = stop.recv() => break,
            }
        }
    });

    Ok(rx)
}
