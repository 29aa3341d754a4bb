//! The closed set of error kinds REC can raise, and their HTTP translation.
//!
//! Every error that crosses a module boundary in this crate is a `RecError`
//! variant rather than an ad-hoc string. The variant name IS the wire
//! `error_kind` (see `§7` of the design doc): the HTTP layer never downgrades
//! an application error to a generic 500, it serializes the kind and message
//! directly so a client can reconstruct the same error on its side.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum RecError {
    #[error("no session named '{0}'")]
    SessionNotFound(String),

    #[error("a session named '{0}' already exists")]
    SessionExists(String),

    #[error("session '{0}' is busy running another command")]
    SessionBusy(String),

    #[error("session '{0}' could not be spawned: {1}")]
    SpawnFailed(String, String),

    #[error("command timed out")]
    CommandTimeout,

    #[error("command timed out and could not recover")]
    CommandTimeoutUnrecoverable,

    #[error("command exited with status {exit_code}: {output}")]
    CommandFailed { exit_code: i32, output: String },

    #[error("pty channel is closed")]
    ChannelClosed,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("path is a directory: {0}")]
    IsDirectory(String),

    #[error("parent path is not a directory: {0}")]
    NotADirectory(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("could not decode file contents: {0}")]
    DecodeError(String),

    #[error("authentication failed")]
    AuthFailed,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RecError {
    /// The stable, contract-level name clients match on. Never renamed to
    /// track an internal refactor.
    pub fn kind(&self) -> &'static str {
        match self {
            RecError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            RecError::SessionExists(_) => "SESSION_EXISTS",
            RecError::SessionBusy(_) => "SESSION_BUSY",
            RecError::SpawnFailed(_, _) => "SPAWN_FAILED",
            RecError::CommandTimeout => "COMMAND_TIMEOUT",
            RecError::CommandTimeoutUnrecoverable => "COMMAND_TIMEOUT_UNRECOVERABLE",
            RecError::CommandFailed { .. } => "COMMAND_FAILED",
            RecError::ChannelClosed => "CHANNEL_CLOSED",
            RecError::FileNotFound(_) => "FILE_NOT_FOUND",
            RecError::IsDirectory(_) => "IS_DIRECTORY",
            RecError::NotADirectory(_) => "NOT_A_DIRECTORY",
            RecError::PermissionDenied(_) => "PERMISSION_DENIED",
            RecError::DecodeError(_) => "DECODE_ERROR",
            RecError::AuthFailed => "AUTH_FAILED",
            RecError::BadRequest(_) => "BAD_REQUEST",
            RecError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for this error. Auth failures are genuine transport-level
    /// 401s; every other application error is reported as 511 so clients can
    /// distinguish "REC understood the request and it failed" from ordinary
    /// transport failures (connection refused, proxy 502, etc.), per §4.7.
    fn status(&self) -> StatusCode {
        match self {
            RecError::AuthFailed => StatusCode::UNAUTHORIZED,
            RecError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RecError::SessionNotFound(_) | RecError::FileNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::from_u16(511).expect("511 is a valid status code"),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error_kind: &'static str,
    message: String,
}

impl IntoResponse for RecError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error_kind: self.kind(),
            message: self.to_string(),
        };
        match status {
            StatusCode::UNAUTHORIZED => tracing::warn!(kind = body.error_kind, "auth failed"),
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
                tracing::warn!(kind = body.error_kind, message = %body.message, "request rejected");
            }
            _ => tracing::error!(kind = body.error_kind, message = %body.message, "application error"),
        }
        (status, Json(body)).into_response()
    }
}

pub type RecResult<T> = Result<T, RecError>;
