//! Signal-driven shutdown, §1's carved-out boundary: "signal-driven
//! process lifecycle" beyond SIGTERM/SIGINT is out of scope for the
//! core, but the daemon binary still needs to stop cleanly on either.
//!
//! SIGHUP (config reload) is intentionally not handled here — it's
//! named in §1's out-of-scope list alongside the rest of the process
//! lifecycle and isn't part of this daemon's boot/shutdown contract.

use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

/// Resolves once either SIGTERM or SIGINT is received.
pub async fn wait_for_shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            std::future::pending::<()>().await;
            unreachable!()
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }
}
