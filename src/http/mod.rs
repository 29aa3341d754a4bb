//! HTTP Surface (C7): the axum `Router` that exposes C3--C6 over an
//! authenticated JSON API, per spec §6.
//!
//! The teacher has no HTTP layer -- it speaks MCP over stdio (`rmcp`). This
//! module is grounded on the pack's other axum repo (`visiquate-cco`) and the
//! axum usage scattered across `other_examples/manifests`: a `Router` with
//! per-route handlers, a `State<Arc<AppState>>` extractor, and
//! `axum::middleware::from_fn_with_state` layering auth onto everything
//! except the two endpoints spec §6 marks as unauthenticated.

pub mod auth;
pub mod routes;
pub mod types;

use crate::config::Config;
use crate::registry::SessionRegistry;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub sessions: SessionRegistry,
    pub config: Config,
    pub auth_token: String,
    /// Signalled by `POST /close`; the supervisor (C8) awaits this to start
    /// graceful shutdown instead of polling.
    pub shutdown: Notify,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/create_session", post(routes::create_session))
        .route("/run_in_session", post(routes::run_in_session))
        .route("/interrupt_session", post(routes::interrupt_session))
        .route("/close_session", post(routes::close_session))
        .route("/execute", post(routes::execute))
        .route("/read_file", post(routes::read_file))
        .route("/write_file", post(routes::write_file))
        .route("/upload", post(routes::upload))
        .route("/close", post(routes::close))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    let public = Router::new()
        .route("/", get(routes::hello))
        .route("/is_alive", get(routes::is_alive));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
