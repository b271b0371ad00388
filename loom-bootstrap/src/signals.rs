// /////////////////////////////////////////////////////////////////////////////
// Loom
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! OS signal handling, wired into a [`crate::shutdown::ShutdownCoordinator`].
//!
//! On Unix, both SIGINT and SIGTERM initiate graceful shutdown. On other
//! platforms only Ctrl-C is available via `tokio::signal`.

use crate::shutdown::ShutdownCoordinator;

/// Wait for a termination signal, then call [`ShutdownCoordinator::initiate_shutdown`].
///
/// Intended to be spawned as its own task: `tokio::spawn(signals::watch(coordinator))`.
pub async fn watch(coordinator: ShutdownCoordinator) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("failed to install SIGINT handler: {e}");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {e}");
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("failed to install Ctrl-C handler");
            return;
        }
        tracing::info!("received Ctrl-C");
    }

    coordinator.initiate_shutdown();
}
