//! Entry point for the Remote Execution Core HTTP service.
//!
//! Parses CLI flags, resolves the auth token, initializes tracing to stdout
//! (there's no stdio transport to protect here, unlike an MCP server), binds
//! the listener, and runs axum with a graceful shutdown hook driven by the
//! supervisor.

use anyhow::Result;
use clap::Parser;
use rec::config::{Config, ExitCode};
use rec::http::{build_router, AppState};
use rec::registry::SessionRegistry;
use rec::supervisor;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_ansi(false)
        .init();

    let config = Config::parse();
    supervisor::log_startup(&config);

    let auth_token = match config.resolve_auth_token() {
        Ok(token) => token,
        Err(()) => {
            tracing::error!("--auth-token was set to an empty string; refusing to start");
            std::process::exit(ExitCode::AuthMisconfigured as i32);
        }
    };

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(host = %config.host, port = config.port, error = %e, "invalid bind address");
            std::process::exit(ExitCode::BindFailure as i32);
        }
    };

    let state = Arc::new(AppState {
        sessions: SessionRegistry::new(),
        config: config.clone(),
        auth_token,
        shutdown: Notify::new(),
    });

    let app = build_router(state.clone());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind listener");
            std::process::exit(ExitCode::BindFailure as i32);
        }
    };
    tracing::info!(%addr, "listening");

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            supervisor::wait_for_shutdown_signal(shutdown_state).await;
        })
        .await?;

    supervisor::shutdown(&state).await;
    std::process::exit(ExitCode::Normal as i32);
}
