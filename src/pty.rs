//! PTY Channel (C1): spawn a child shell attached to a pseudo-terminal and
//! expose raw, unbuffered read/write/signal/close primitives.
//!
//! Grounded on the teacher's `ShellSession` PTY setup (`pty_process::open`,
//! wide terminal to avoid wrapping, `--norc --noprofile`), generalized into
//! a standalone channel that does not know about sentinels or sessions --
//! that's C2/C3's job. Bytes are read exactly once; the channel does no
//! internal buffering beyond a single OS read chunk, as required by §4.1.

use crate::error::{RecError, RecResult};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Wide enough that normal shell output doesn't wrap, which would otherwise
/// interleave carriage returns into the sentinel line and break matching.
const PTY_ROWS: u16 = 24;
const PTY_COLS: u16 = 250;

const READ_CHUNK: usize = 4096;

pub struct PtyChannel {
    child: tokio::process::Child,
    writer: Option<pty_process::OwnedWritePty>,
    reader: Option<pty_process::OwnedReadPty>,
    pid: i32,
    closed: bool,
}

impl PtyChannel {
    /// Spawn `/bin/bash` with rc/profile/history disabled so the prompt
    /// sequence is deterministic, attached to a fresh PTY pair.
    pub async fn spawn_bash(working_directory: Option<&str>) -> RecResult<Self> {
        let (pty, pts) = pty_process::open()
            .map_err(|e| RecError::SpawnFailed("bash".into(), format!("open PTY: {e}")))?;

        pty.resize(pty_process::Size::new(PTY_ROWS, PTY_COLS))
            .map_err(|e| RecError::SpawnFailed("bash".into(), format!("resize PTY: {e}")))?;

        let mut cmd = pty_process::Command::new("/bin/bash")
            .arg("--norc")
            .arg("--noprofile")
            .env_remove("HISTFILE")
            .env("PROMPT_COMMAND", "");

        if let Some(dir) = working_directory {
            cmd = cmd.current_dir(dir);
        }

        let child = cmd
            .spawn(pts)
            .map_err(|e| RecError::SpawnFailed("bash".into(), format!("spawn: {e}")))?;
        let pid = child
            .id()
            .ok_or_else(|| RecError::SpawnFailed("bash".into(), "no pid after spawn".into()))?
            as i32;

        let (read_pty, write_pty) = pty.into_split();

        Ok(Self {
            child,
            writer: Some(write_pty),
            reader: Some(read_pty),
            pid,
            closed: false,
        })
    }

    /// Write raw bytes to the PTY (the child's stdin).
    pub async fn write(&mut self, bytes: &[u8]) -> RecResult<()> {
        let writer = self.writer.as_mut().ok_or(RecError::ChannelClosed)?;
        writer
            .write_all(bytes)
            .await
            .map_err(|_| RecError::ChannelClosed)?;
        writer.flush().await.map_err(|_| RecError::ChannelClosed)
    }

    /// Read whatever bytes are currently available, up to one OS read chunk.
    /// Returns `Ok(None)` on end-of-stream (child exited).
    pub async fn read_chunk(&mut self) -> RecResult<Option<Vec<u8>>> {
        let reader = self.reader.as_mut().ok_or(RecError::ChannelClosed)?;
        let mut buf = [0u8; READ_CHUNK];
        match reader.read(&mut buf).await {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(_) => Ok(None),
        }
    }

    /// Send a signal to the PTY's foreground process group. Since the shell
    /// is the session leader of its own PTY, `-pid` addresses that group.
    pub fn send_signal(&self, signal: Signal) -> RecResult<()> {
        signal::kill(Pid::from_raw(-self.pid), signal)
            .map_err(|e| RecError::Internal(format!("signal delivery failed: {e}")))
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// True if the child process has not yet exited.
    pub fn is_alive(&mut self) -> bool {
        !self.closed && matches!(self.child.try_wait(), Ok(None))
    }

    /// Terminate the child and release the PTY. Idempotent: calling `close`
    /// on an already-closed channel is a no-op success.
    pub async fn close(&mut self) -> RecResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let _ = signal::kill(Pid::from_raw(self.pid), Signal::SIGHUP);

        // Dropping the PTY halves closes the master fd, which also delivers
        // SIGHUP, but doing it explicitly lets us bound the wait below even
        // if the child ignores the first signal.
        self.writer.take();
        self.reader.take();

        if tokio::time::timeout(std::time::Duration::from_millis(500), self.child.wait())
            .await
            .is_err()
        {
            let _ = signal::kill(Pid::from_raw(self.pid), Signal::SIGKILL);
            let _ = tokio::time::timeout(std::time::Duration::from_millis(500), self.child.wait())
                .await;
        }

        Ok(())
    }
}

impl Drop for PtyChannel {
    fn drop(&mut self) {
        // Best-effort: dropping the owned PTY halves closes the fds, which
        // sends SIGHUP to the child even if `close()` was never called.
        self.writer.take();
        self.reader.take();
    }
}
