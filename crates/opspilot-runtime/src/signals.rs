// crates/opspilot-runtime/src/signals.rs
// ============================================================================
// Module: Shutdown Signal
// Description: Waits for the first of SIGINT/SIGTERM (or, on non-Unix
// targets, only ctrl-c) to request a graceful shutdown.
// Purpose: Give the composition root a single future to race against the
// running kernel.
// Dependencies: tokio::signal
// ============================================================================

//! ## Overview
//! Driven directly by the runtime's cancellation model: a clean shutdown
//! exits 0, a startup failure or unclean shutdown exits 1.
//! [`wait_for_shutdown_signal`] resolves on `Ctrl+C` or, on Unix,
//! `SIGTERM`, whichever arrives first.

/// Waits until an operator-initiated shutdown is requested.
///
/// # Panics
///
/// Panics if the process's signal handlers cannot be installed, which only
/// happens if the underlying OS signal API itself fails.
#[allow(clippy::expect_used, reason = "failure to install a signal handler is a fatal startup condition, not a recoverable error")]
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::signal;
        use tokio::signal::unix::SignalKind;

        let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
