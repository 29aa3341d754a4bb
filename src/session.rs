//! Session (C3): the state machine that drives a [`PtyChannel`] through the
//! sentinel protocol, including the timeout/RECOVERING procedure of §4.3.
//!
//! Grounded on the teacher's `ShellSession::exec` timeout handling (double
//! SIGINT, `\x03` fallback, bounded resync read) in `session.rs`, generalized
//! to the explicit six-step contract spec §4.3 describes and to the
//! `expect`-based alternative sentinel spec §4.2 adds, which the teacher does
//! not have (the teacher only ever waits for its own start/end markers).

use crate::config::Config;
use crate::error::{RecError, RecResult};
use crate::pty::PtyChannel;
use crate::sentinel::{self, find_exit_sentinel};
use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use std::time::Duration;

/// Output is bounded defensively so a runaway command (`yes`, `cat /dev/zero`)
/// can't grow the buffer without limit while we wait for a sentinel that will
/// never come (the timeout will still fire and reclaim the session).
const MAX_BUFFER_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Recovering,
    Closed,
}

/// A session action request, the domain form of the wire `SessionAction`
/// described in spec §3.
#[derive(Debug, Clone)]
pub struct SessionAction {
    pub command: String,
    /// Positive seconds, or `None`/non-positive meaning "use the configured
    /// default", per §3.
    pub timeout: Option<f64>,
    pub is_interactive_command: bool,
    pub expect: Option<String>,
    pub check: bool,
}

#[derive(Debug, Clone)]
pub struct SessionRunResult {
    pub output: String,
    pub exit_code: i32,
    pub failure_reason: String,
    pub expect_string: String,
    pub session_type: String,
}

pub struct Session {
    name: String,
    kind: String,
    pty: PtyChannel,
    state: SessionState,
    buffer: Vec<u8>,
    ps1_unique: String,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

impl Session {
    /// Spawn the shell, bind its prompt to a fresh sentinel, and sync to the
    /// first prompt so the session starts IDLE. Per §4.3 `open`.
    pub async fn open(name: String, kind: String, working_directory: Option<&str>) -> RecResult<Self> {
        if kind != "bash" {
            return Err(RecError::BadRequest(format!("unsupported session kind '{kind}'")));
        }

        let mut pty = PtyChannel::spawn_bash(working_directory).await?;
        let ps1_unique = sentinel::generate_ps1();

        // `stty -echo` first: with echo on, bash (interactive on a PTY)
        // echoes every line we write back to us, polluting `output` with the
        // framed command itself. PS2 empty avoids the shell ever waiting on
        // a continuation prompt that would never match our sentinel scan.
        let setup = format!("stty -echo\nexport PS1='{ps1_unique}' PS2=''\n");
        pty.write(setup.as_bytes()).await?;
        pty.write(b"\n").await?;

        let mut session = Self {
            name,
            kind,
            pty,
            state: SessionState::Running,
            buffer: Vec::new(),
            ps1_unique,
            created_at: Utc::now(),
            last_activity: Utc::now(),
        };

        // Consume output until the first prompt so a caller's first `run`
        // doesn't race the shell's own startup banner.
        let deadline = Duration::from_secs(10);
        let start = tokio::time::Instant::now();
        loop {
            if start.elapsed() > deadline {
                session.state = SessionState::Closed;
                let _ = session.pty.close().await;
                return Err(RecError::SpawnFailed(
                    session.name.clone(),
                    "shell did not reach an initial prompt in time".into(),
                ));
            }
            match session.pty.read_chunk().await? {
                None => {
                    session.state = SessionState::Closed;
                    return Err(RecError::SpawnFailed(
                        session.name.clone(),
                        "shell exited during startup".into(),
                    ));
                }
                Some(chunk) => {
                    session.push_buffer(&chunk);
                    let text = String::from_utf8_lossy(&session.buffer);
                    if text.contains(&session.ps1_unique) {
                        break;
                    }
                }
            }
        }

        session.state = SessionState::Idle;
        session.buffer.clear();
        Ok(session)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The PTY's process-group id, stable for the session's whole lifetime.
    /// Exposed so the registry can deliver `interrupt_session`'s `SIGINT`
    /// without taking the session's own lock (§5: interrupt must return
    /// immediately even while a `run` is in flight on that same session).
    pub fn pid(&self) -> i32 {
        self.pty.pid()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    fn push_buffer(&mut self, chunk: &[u8]) {
        if self.buffer.len() < MAX_BUFFER_BYTES {
            let remaining = MAX_BUFFER_BYTES - self.buffer.len();
            let take = remaining.min(chunk.len());
            self.buffer.extend_from_slice(&chunk[..take]);
        }
    }

    /// Run a command to completion (or timeout/recovery), per §4.3 `run`.
    pub async fn run(&mut self, action: SessionAction, config: &Config) -> RecResult<SessionRunResult> {
        if self.state == SessionState::Closed {
            return Err(RecError::SessionNotFound(self.name.clone()));
        }
        if self.state != SessionState::Idle {
            return Err(RecError::SessionBusy(self.name.clone()));
        }

        self.state = SessionState::Running;
        self.buffer.clear();
        self.last_activity = Utc::now();

        let expect_re = match action.expect.as_deref() {
            Some(pattern) => Some(
                sentinel::compile_expect(pattern)
                    .map_err(|e| RecError::BadRequest(format!("invalid expect regex: {e}")))?,
            ),
            None => None,
        };

        let deadline = effective_timeout(action.timeout, config.default_command_timeout);
        let wrapped = sentinel::frame_command(&action.command);
        self.pty.write(wrapped.as_bytes()).await?;

        let result = tokio::time::timeout(
            deadline,
            self.wait_for_completion(expect_re.as_ref(), &action.command),
        )
        .await;

        let run_result = match result {
            Ok(Ok(outcome)) => {
                self.state = SessionState::Idle;
                self.last_activity = Utc::now();
                outcome
            }
            Ok(Err(RecError::ChannelClosed)) => {
                self.state = SessionState::Closed;
                SessionRunResult {
                    output: self.current_output(&action.command),
                    exit_code: -1,
                    failure_reason: "session exited".into(),
                    expect_string: String::new(),
                    session_type: self.kind.clone(),
                }
            }
            Ok(Err(e)) => return Err(e),
            Err(_timeout_elapsed) => self.recover(config, &action.command).await?,
        };

        if action.check && run_result.exit_code != 0 && run_result.failure_reason.is_empty() {
            return Err(RecError::CommandFailed {
                exit_code: run_result.exit_code,
                output: run_result.output,
            });
        }

        Ok(run_result)
    }

    fn current_output(&self, command: &str) -> String {
        let raw = String::from_utf8_lossy(&self.buffer);
        let cleaned = sentinel::strip_ansi(&raw);
        sentinel::normalize_output(&cleaned, command)
    }

    /// Read chunks until either the exit sentinel (+ following prompt) or a
    /// custom `expect` pattern matches, per §4.2/§4.3. Returns `Err` only on
    /// unrecoverable channel conditions; timeout is handled by the caller via
    /// `tokio::time::timeout` wrapping this call.
    async fn wait_for_completion(
        &mut self,
        expect_re: Option<&regex::Regex>,
        command: &str,
    ) -> RecResult<SessionRunResult> {
        loop {
            let text_owned = String::from_utf8_lossy(&self.buffer).into_owned();

            if let Some(re) = expect_re {
                if let Some(m) = re.find(&text_owned) {
                    let output = sentinel::normalize_output(&sentinel::strip_ansi(&text_owned[..m.start()]), command);
                    self.state = SessionState::Idle;
                    return Ok(SessionRunResult {
                        output: output.trim_end().to_string(),
                        exit_code: 0,
                        failure_reason: String::new(),
                        expect_string: m.as_str().to_string(),
                        session_type: self.kind.clone(),
                    });
                }
            }

            if let Some(exit_match) = find_exit_sentinel(&text_owned) {
                if sentinel::find_from(&text_owned, &self.ps1_unique, exit_match.end).is_some() {
                    let raw_output = &text_owned[..exit_match.start];
                    let output = sentinel::normalize_output(&sentinel::strip_ansi(raw_output), command);
                    return Ok(SessionRunResult {
                        output: output.trim_end().to_string(),
                        exit_code: exit_match.exit_code,
                        failure_reason: String::new(),
                        expect_string: self.ps1_unique.clone(),
                        session_type: self.kind.clone(),
                    });
                }
            } else if expect_re.is_some() {
                // No custom expect yet and no exit sentinel: a bare prompt
                // reappearing means the sub-REPL exited without our wrapper
                // ever running (e.g. it crashed out), so exit code is
                // indeterminable per §4.2.
                if let Some(ps1_pos) = text_owned.find(&self.ps1_unique) {
                    let output = sentinel::normalize_output(&sentinel::strip_ansi(&text_owned[..ps1_pos]), command);
                    self.state = SessionState::Idle;
                    return Ok(SessionRunResult {
                        output: output.trim_end().to_string(),
                        exit_code: -1,
                        failure_reason: String::new(),
                        expect_string: self.ps1_unique.clone(),
                        session_type: self.kind.clone(),
                    });
                }
            }

            match self.pty.read_chunk().await? {
                None => return Err(RecError::ChannelClosed),
                Some(chunk) => self.push_buffer(&chunk),
            }
        }
    }

    /// The six-step timeout/RECOVERING procedure of §4.3.
    async fn recover(&mut self, config: &Config, command: &str) -> RecResult<SessionRunResult> {
        self.state = SessionState::Recovering;
        let grace = Duration::from_millis(config.recovery_grace_ms);

        // Step 1 + 2: first SIGINT, short grace window for the prompt.
        self.pty.send_signal(Signal::SIGINT)?;
        if self.resync_within(grace).await {
            return Ok(self.recovered_result(command));
        }

        // Step 3: second SIGINT, wait again.
        self.pty.send_signal(Signal::SIGINT)?;
        if self.resync_within(grace).await {
            return Ok(self.recovered_result(command));
        }

        // Step 4: raw ETX byte plus a lone newline, then a longer bounded
        // resync read.
        let _ = self.pty.write(b"\x03").await;
        let _ = self.pty.write(b"\n").await;
        let resync_deadline = Duration::from_millis(config.recovery_resync_ms);
        if self.resync_within(resync_deadline).await {
            return Ok(self.recovered_result(command));
        }

        // Step 6: unrecoverable. Close the session and raise the named
        // error so `COMMAND_TIMEOUT_UNRECOVERABLE` reaches the client,
        // rather than burying it in a successful result's failure_reason.
        self.state = SessionState::Closed;
        let _ = self.pty.close().await;
        Err(RecError::CommandTimeoutUnrecoverable)
    }

    /// Read until `PS1_UNIQUE` reappears or `window` elapses. Returns `true`
    /// on resync.
    async fn resync_within(&mut self, window: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            {
                let text = String::from_utf8_lossy(&self.buffer);
                if text.contains(&self.ps1_unique) {
                    return true;
                }
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match tokio::time::timeout(remaining, self.pty.read_chunk()).await {
                Ok(Ok(Some(chunk))) => self.push_buffer(&chunk),
                Ok(Ok(None)) => return false,
                Ok(Err(_)) => return false,
                Err(_) => return false,
            }
        }
    }

    /// Step 5: resync succeeded -- report the timeout, restore IDLE, keep
    /// whatever output had accumulated before the prompt reappeared.
    fn recovered_result(&mut self, command: &str) -> SessionRunResult {
        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        let end = text.find(&self.ps1_unique).unwrap_or(text.len());
        let output = sentinel::strip_ansi(&sentinel::normalize_output(&text[..end], command));
        self.state = SessionState::Idle;
        self.last_activity = Utc::now();
        SessionRunResult {
            output: output.trim_end().to_string(),
            exit_code: -1,
            failure_reason: "command timed out".into(),
            expect_string: self.ps1_unique.clone(),
            session_type: self.kind.clone(),
        }
    }

    /// Send SIGINT to the foreground process group, per §4.3 `interrupt`.
    /// The registry signals via `pid()` directly instead of calling this, so
    /// that interrupting a session never has to wait for its own in-flight
    /// `run` to release the session lock.
    pub fn interrupt(&self) -> RecResult<()> {
        self.pty.send_signal(Signal::SIGINT)
    }

    /// Idempotent teardown: SIGHUP, grace window, SIGKILL if still alive.
    pub async fn close(&mut self) -> RecResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.pty.close().await
    }
}

/// `min(action.timeout, default_timeout)`, with the "absent or non-positive
/// means use the default" rule from §3 applied first.
fn effective_timeout(requested: Option<f64>, default_secs: u64) -> Duration {
    let default = default_secs as f64;
    let secs = match requested {
        Some(t) if t > 0.0 => t.min(default),
        _ => default,
    };
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_timeout_uses_default_when_absent() {
        assert_eq!(effective_timeout(None, 300), Duration::from_secs(300));
    }

    #[test]
    fn effective_timeout_uses_default_when_non_positive() {
        assert_eq!(effective_timeout(Some(-1.0), 300), Duration::from_secs(300));
        assert_eq!(effective_timeout(Some(0.0), 300), Duration::from_secs(300));
    }

    #[test]
    fn effective_timeout_clamps_to_default_ceiling() {
        assert_eq!(effective_timeout(Some(1000.0), 300), Duration::from_secs(300));
    }

    #[test]
    fn effective_timeout_honors_smaller_request() {
        assert_eq!(effective_timeout(Some(5.0), 300), Duration::from_secs(5));
    }
}
