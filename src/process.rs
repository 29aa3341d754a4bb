//! One-shot Executor (C5): run a sub-process without a PTY, capturing stdout
//! and stderr as independent streams with an optional timeout.
//!
//! Grounded on the teacher's `process::run` (`process.rs`): `tokio::process`
//! spawn with piped stdio, concurrent reader tasks, `kill_on_drop`, and
//! `setsid` so a timeout can kill the whole process group rather than just
//! the immediate child. Unlike the teacher, REC keeps stdout and stderr as
//! two independent streams (spec §3 wants `stdout`/`stderr` separately, not
//! the teacher's single interleaved `lines` buffer) and drops the
//! dangerous-command blocklist: spec §1 makes "does not interpret or rewrite
//! user commands" an explicit Non-goal, and a pattern-matched command
//! blocklist is exactly that kind of interpretation.

use crate::error::RecError;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Request to run a one-shot command, the domain form of spec §3's
/// "Command request (one-shot)".
#[derive(Debug, Clone)]
pub struct ExecRequest {
    pub argv: Vec<String>,
    pub cwd: Option<String>,
    pub env: HashMap<String, String>,
    pub timeout_seconds: Option<f64>,
    pub shell: bool,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub failure_reason: String,
}

/// Spawn and wait for `request`, capturing stdout/stderr independently.
/// Never retries (§4.5): a spawn failure or timeout is reported once.
pub async fn execute(request: ExecRequest) -> Result<ExecResult, RecError> {
    if request.argv.is_empty() {
        return Err(RecError::BadRequest("argv must not be empty".into()));
    }

    let mut cmd = if request.shell {
        let mut c = Command::new("/bin/sh");
        c.arg("-c").arg(&request.argv[0]);
        c
    } else {
        let mut c = Command::new(&request.argv[0]);
        c.args(&request.argv[1..]);
        c
    };

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    // Environment overlay merges key-by-key onto the inherited environment,
    // per §4.5 -- it is never a full replacement.
    for (key, value) in &request.env {
        cmd.env(key, value);
    }

    if let Some(dir) = &request.cwd {
        cmd.current_dir(dir);
    }

    // SAFETY: pre_exec runs in the forked child before exec; setsid only
    // touches the child's own process group, never parent state.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::other)?;
            Ok(())
        });
    }

    let start = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| RecError::SpawnFailed(request.argv[0].clone(), e.to_string()))?;

    let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped");
    drop(child.stdin.take());

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    let (timed_out, exit_code) = match request.timeout_seconds {
        Some(secs) if secs > 0.0 => {
            match tokio::time::timeout(Duration::from_secs_f64(secs), child.wait()).await {
                Ok(Ok(status)) => (false, status.code().unwrap_or(-1)),
                Ok(Err(_)) => (false, -1),
                Err(_) => {
                    kill_process_group(&child);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    if matches!(child.try_wait(), Ok(None)) {
                        kill_process_group_hard(&child);
                    }
                    let _ = child.wait().await;
                    (true, -1)
                }
            }
        }
        _ => match child.wait().await {
            Ok(status) => (false, status.code().unwrap_or(-1)),
            Err(_) => (false, -1),
        },
    };

    let stdout_bytes = stdout_task.await.unwrap_or_default();
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    let _ = start.elapsed();

    Ok(ExecResult {
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        exit_code,
        failure_reason: if timed_out { "timeout".to_string() } else { String::new() },
    })
}

fn kill_process_group(child: &tokio::process::Child) {
    send_group_signal(child, nix::sys::signal::Signal::SIGTERM);
}

fn kill_process_group_hard(child: &tokio::process::Child) {
    send_group_signal(child, nix::sys::signal::Signal::SIGKILL);
}

fn send_group_signal(child: &tokio::process::Child, signal: nix::sys::signal::Signal) {
    if let Some(pid) = child.id() {
        let _ = nix::sys::signal::kill(nix::unistd::Pid::from_raw(-(pid as i32)), signal);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_captures_stdout() {
        let result = execute(ExecRequest {
            argv: vec!["echo".into(), "Hello, world!".into()],
            cwd: None,
            env: HashMap::new(),
            timeout_seconds: None,
            shell: false,
        })
        .await
        .unwrap();
        assert_eq!(result.stdout, "Hello, world!\n");
        assert_eq!(result.stderr, "");
        assert_eq!(result.exit_code, 0);
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported() {
        let result = execute(ExecRequest {
            argv: vec!["false".into()],
            cwd: None,
            env: HashMap::new(),
            timeout_seconds: None,
            shell: false,
        })
        .await
        .unwrap();
        assert_eq!(result.exit_code, 1);
    }

    #[tokio::test]
    async fn shell_mode_runs_through_sh_c() {
        let result = execute(ExecRequest {
            argv: vec!["echo a && echo b".into()],
            cwd: None,
            env: HashMap::new(),
            timeout_seconds: None,
            shell: true,
        })
        .await
        .unwrap();
        assert_eq!(result.stdout, "a\nb\n");
    }

    #[tokio::test]
    async fn env_overlay_merges_onto_inherited_environment() {
        unsafe {
            std::env::set_var("REC_TEST_INHERITED", "inherited");
        }
        let mut env = HashMap::new();
        env.insert("REC_TEST_OVERLAY".to_string(), "overlay".to_string());

        let result = execute(ExecRequest {
            argv: vec!["sh".into(), "-c".into(), "echo $REC_TEST_INHERITED $REC_TEST_OVERLAY".into()],
            cwd: None,
            env,
            timeout_seconds: None,
            shell: false,
        })
        .await
        .unwrap();
        assert_eq!(result.stdout, "inherited overlay\n");
    }

    #[tokio::test]
    async fn timeout_kills_process_and_reports_minus_one() {
        let start = Instant::now();
        let result = execute(ExecRequest {
            argv: vec!["sleep".into(), "30".into()],
            cwd: None,
            env: HashMap::new(),
            timeout_seconds: Some(0.5),
            shell: false,
        })
        .await
        .unwrap();
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.failure_reason, "timeout");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn empty_argv_is_bad_request() {
        let err = execute(ExecRequest {
            argv: vec![],
            cwd: None,
            env: HashMap::new(),
            timeout_seconds: None,
            shell: false,
        })
        .await;
        assert!(matches!(err, Err(RecError::BadRequest(_))));
    }
}
