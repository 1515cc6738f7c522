// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! SIGTERM and SIGINT (Ctrl+C) cancel a [`CancellationToken`] that the
//! conversation loop, the state sweeper and in-flight provider calls all
//! watch. Turns already running are drained before the process exits.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a token that is cancelled when either signal arrives.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating shutdown"),
                        _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, listening for Ctrl+C only");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Waits up to `timeout` for running turns, then aborts the rest.
pub async fn drain_turns(turns: &mut JoinSet<()>, timeout: Duration) {
    if turns.is_empty() {
        info!("no active turns to drain");
        return;
    }
    info!(count = turns.len(), "waiting for active turns to complete");

    let drained = tokio::time::timeout(timeout, async {
        while let Some(joined) = turns.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "turn ended abnormally during drain");
            }
        }
    })
    .await;

    match drained {
        Ok(()) => info!("all turns drained successfully"),
        Err(_) => {
            warn!(remaining = turns.len(), "timeout reached, aborting remaining turns");
            turns.abort_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_signal_handler_returns_live_token() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
        token.cancel();
    }

    #[tokio::test]
    async fn drain_with_nothing_running_returns_immediately() {
        let mut turns = JoinSet::new();
        drain_turns(&mut turns, Duration::from_secs(3600)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_short_turns() {
        let mut turns = JoinSet::new();
        turns.spawn(async { tokio::time::sleep(Duration::from_millis(50)).await });
        drain_turns(&mut turns, Duration::from_secs(5)).await;
        assert!(turns.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_aborts_turns_past_the_timeout() {
        let mut turns = JoinSet::new();
        turns.spawn(async { tokio::time::sleep(Duration::from_secs(600)).await });
        drain_turns(&mut turns, Duration::from_secs(1)).await;
        while let Some(joined) = turns.join_next().await {
            assert!(joined.unwrap_err().is_cancelled());
        }
    }
}
