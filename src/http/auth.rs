//! Bearer-token auth middleware (§4.7): every non-trivial endpoint requires
//! `Authorization: Bearer <token>` equal to the process's startup token.
//! Checked before the request body is read, so a mismatched or missing
//! token never touches session/process/file state (§8 property 9).

use super::AppState;
use crate::error::RecError;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;

pub async fn require_bearer_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, RecError> {
    let presented = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if constant_time_eq(token.as_bytes(), state.auth_token.as_bytes()) => {
            Ok(next.run(request).await)
        }
        _ => Err(RecError::AuthFailed),
    }
}

/// Avoids leaking token length/content via early-exit string comparison
/// timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
