//! Process-wide cancellation.
//!
//! A single `watch::channel(false)` carries the shutdown flag. Every loop and
//! every suspended action holds a receiver; flipping the value to `true` (or
//! dropping the sender) tears everything down.

use tokio::sync::watch;
use tracing::info;

/// Receiving half of the shutdown flag.
pub type ShutdownRx = watch::Receiver<bool>;

/// Sending half of the shutdown flag.
pub type ShutdownTx = watch::Sender<bool>;

/// Create a fresh, untriggered shutdown flag.
pub fn channel() -> (ShutdownTx, ShutdownRx) {
    watch::channel(false)
}

/// Whether shutdown has already been requested.
pub fn is_requested(rx: &ShutdownRx) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

/// Resolve once shutdown is requested or the sender is gone.
pub async fn requested(rx: &mut ShutdownRx) {
    // An error means the sender was dropped, which also ends the process.
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Wait for Ctrl-C (or SIGTERM on Unix) and flip the flag.
pub async fn trigger_on_signal(tx: ShutdownTx) {
    wait_for_signal().await;
    info!("received shutdown signal, initiating graceful shutdown");
    let _ = tx.send(true);
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
