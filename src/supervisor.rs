//! Supervisor (C8): process lifecycle -- startup logging, binding, and the
//! shutdown sequence that tears every session down before the process exits.
//!
//! Grounded on the teacher's `main.rs` startup logging idiom, generalized
//! from "wait on stdio EOF" to "wait on SIGTERM/SIGINT/`POST /close`, then
//! drain sessions with a deadline" since REC is a long-lived network service
//! rather than a one-shot stdio subprocess.

use crate::config::Config;
use crate::http::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};

/// Blocks until SIGTERM, SIGINT, or `state.shutdown` is notified (the
/// `POST /close` endpoint), whichever comes first.
pub async fn wait_for_shutdown_signal(state: Arc<AppState>) {
    let mut sigterm = signal(SignalKind::terminate()).expect("installing SIGTERM handler");

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = tokio::signal::ctrl_c() => tracing::info!("received SIGINT"),
        _ = state.shutdown.notified() => tracing::info!("received close request"),
    }
}

/// Drain every live session with a bounded deadline, per §6's closing note
/// that shutdown always tries to leave child processes cleanly terminated.
pub async fn shutdown(state: &AppState) {
    // `close_all` also marks the registry closed to new `create` calls, per
    // §4.8 ("mark registry closed, close_all with a bounded deadline").
    tracing::info!("shutting down: closing all sessions");
    let deadline = Duration::from_millis(state.config.shutdown_deadline_ms);
    state.sessions.close_all(deadline).await;
    tracing::info!("shutdown complete");
}

pub fn log_startup(config: &Config) {
    tracing::info!("Starting runtime");
    tracing::info!(
        host = %config.host,
        port = config.port,
        version = env!("CARGO_PKG_VERSION"),
        "remote execution core configured"
    );
}
