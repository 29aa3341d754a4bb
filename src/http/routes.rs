//! Route handlers (C7): JSON marshalling and dispatch into C3--C6.
//!
//! Handlers hold no lock across an await boundary except the brief
//! registry-internal ones documented in `registry.rs` -- the router itself
//! never wraps a session operation in its own mutex, per §5.

use super::types::*;
use super::AppState;
use crate::error::{RecError, RecResult};
use crate::files;
use crate::process::{self, ExecRequest};
use crate::session::SessionAction;
use axum::extract::{Multipart, State};
use axum::Json;
use std::sync::Arc;

pub async fn hello() -> Json<HelloResponse> {
    Json(HelloResponse { message: "hello world" })
}

pub async fn is_alive() -> Json<IsAliveResponse> {
    Json(IsAliveResponse { is_alive: true })
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSessionRequest>,
) -> RecResult<Json<CreateSessionResponse>> {
    if req.session.trim().is_empty() {
        return Err(RecError::BadRequest("session name must not be empty".into()));
    }
    let kind = req.kind.unwrap_or_else(|| "bash".to_string());

    tracing::info!(session = %req.session, "create_session");
    let session_type = state
        .sessions
        .create(req.session.clone(), kind, req.working_directory)
        .await?;

    if let Some(startup) = req.startup_source {
        let action = SessionAction {
            command: startup,
            timeout: req.startup_timeout,
            is_interactive_command: false,
            expect: None,
            check: false,
        };
        if let Err(e) = state.sessions.run(&req.session, action, &state.config).await {
            tracing::warn!(session = %req.session, error = %e, "startup_source failed");
        }
    }

    Ok(Json(CreateSessionResponse { session_type }))
}

pub async fn run_in_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunInSessionRequest>,
) -> RecResult<Json<RunInSessionResponse>> {
    let action = SessionAction {
        command: req.command,
        timeout: req.timeout,
        is_interactive_command: req.is_interactive_command,
        expect: req.expect,
        check: req.check,
    };

    tracing::info!(session = %req.session, "run_in_session");
    let result = state.sessions.run(&req.session, action, &state.config).await?;
    tracing::info!(
        session = %req.session,
        exit_code = result.exit_code,
        failure_reason = %result.failure_reason,
        "run_in_session completed"
    );

    Ok(Json(RunInSessionResponse {
        output: result.output,
        exit_code: result.exit_code,
        failure_reason: result.failure_reason,
        expect_string: result.expect_string,
        session_type: result.session_type,
    }))
}

pub async fn interrupt_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionNameRequest>,
) -> RecResult<Json<Empty>> {
    state.sessions.interrupt(&req.session).await?;
    Ok(Json(Empty::default()))
}

pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionNameRequest>,
) -> RecResult<Json<Empty>> {
    tracing::info!(session = %req.session, "close_session");
    // Idempotent per §7: closing twice is success both times.
    state.sessions.close(&req.session).await?;
    Ok(Json(Empty::default()))
}

pub async fn execute(Json(req): Json<ExecuteRequest>) -> RecResult<Json<ExecuteResponse>> {
    let shell = req.shell;
    let argv = req.command.into_argv(shell);

    tracing::info!(argv = ?argv, "execute");
    let result = process::execute(ExecRequest {
        argv,
        cwd: req.cwd,
        env: req.env,
        timeout_seconds: req.timeout,
        shell,
    })
    .await?;
    tracing::info!(exit_code = result.exit_code, "execute completed");

    Ok(Json(ExecuteResponse {
        stdout: result.stdout,
        stderr: result.stderr,
        exit_code: result.exit_code,
    }))
}

pub async fn read_file(Json(req): Json<ReadFileRequest>) -> RecResult<Json<ReadFileResponse>> {
    let content = files::read_file(&req.path, req.encoding.as_deref(), req.errors.as_deref()).await?;
    Ok(Json(ReadFileResponse { content }))
}

pub async fn write_file(Json(req): Json<WriteFileRequest>) -> RecResult<Json<Empty>> {
    files::write_file(&req.path, req.content.as_bytes(), req.create_parents).await?;
    Ok(Json(Empty::default()))
}

/// First multipart field is the destination path, the second is the file
/// contents -- REC's core stays inline-content-only (§4.6 explicitly keeps
/// chunked upload/download out of scope); this is the one caller-facing
/// convenience for sending a file without base64-encoding it into JSON
/// first.
pub async fn upload(mut multipart: Multipart) -> RecResult<Json<Empty>> {
    let mut path: Option<String> = None;
    let mut content: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RecError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        match field.name().unwrap_or("") {
            "path" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| RecError::BadRequest(format!("reading path field: {e}")))?;
                path = Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            "file" | "content" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| RecError::BadRequest(format!("reading file field: {e}")))?;
                content = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let path = path.ok_or_else(|| RecError::BadRequest("missing 'path' field".into()))?;
    let content = content.ok_or_else(|| RecError::BadRequest("missing 'file' field".into()))?;

    files::write_file(&path, &content, true).await?;
    Ok(Json(Empty::default()))
}

pub async fn close(State(state): State<Arc<AppState>>) -> Json<Empty> {
    tracing::info!("close requested; server will exit after responding");
    state.shutdown.notify_one();
    Json(Empty::default())
}
