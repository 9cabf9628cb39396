// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signal-driven shutdown for `parley serve`.
//!
//! SIGINT or SIGTERM cancels a [`CancellationToken`]; the sweeper and the
//! event logger watch it, then [`Engine::shutdown`](crate::Engine::shutdown)
//! stops running searches and closes both stores.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The signal that asked the process to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    Interrupt,
    Terminate,
}

/// Resolves when SIGINT or, on unix, SIGTERM arrives.
pub async fn wait_for_signal() -> StopSignal {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                return tokio::select! {
                    _ = tokio::signal::ctrl_c() => StopSignal::Interrupt,
                    _ = sigterm.recv() => StopSignal::Terminate,
                };
            }
            Err(e) => warn!(error = %e, "SIGTERM unavailable, listening for Ctrl+C only"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler unavailable, shutdown must come from the token");
        std::future::pending::<()>().await;
    }
    StopSignal::Interrupt
}

/// Spawns a task that cancels the returned token on the first stop signal.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        info!(?signal, "stop signal received, draining");
        trigger.cancel();
    });
    token
}
