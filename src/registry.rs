//! Session Registry (C4): a thread-safe, named map of live sessions.
//!
//! Grounded on the teacher's `SessionManager` (`session.rs`): a single async
//! `Mutex<HashMap<..>>` guarding the map itself, with each entry locked only
//! for the duration of one operation so the HTTP layer never holds a
//! registry-wide lock across a session's PTY I/O (§5).

use crate::config::Config;
use crate::error::{RecError, RecResult};
use crate::session::{Session, SessionAction, SessionRunResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub name: String,
    pub kind: String,
    pub alive: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// A session plus the bits the registry needs without taking the session's
/// own lock: `pid` never changes for the session's lifetime, so
/// `interrupt_session` can signal it directly.
struct SessionEntry {
    session: Arc<Mutex<Session>>,
    pid: i32,
}

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
    /// Set by the supervisor (C8) on shutdown so no further sessions are
    /// accepted while existing ones drain, per §4.8.
    closing: Arc<AtomicBool>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn and insert a new session. The only writer of new entries: a
    /// name collision or spawn failure leaves the map unchanged.
    pub async fn create(&self, name: String, kind: String, working_directory: Option<String>) -> RecResult<String> {
        if self.closing.load(Ordering::Acquire) {
            return Err(RecError::BadRequest("server is shutting down".into()));
        }

        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&name) {
            return Err(RecError::SessionExists(name));
        }

        let session = Session::open(name.clone(), kind, working_directory.as_deref()).await?;
        let session_type = session.kind().to_string();
        let pid = session.pid();
        sessions.insert(
            name,
            SessionEntry {
                session: Arc::new(Mutex::new(session)),
                pid,
            },
        );
        Ok(session_type)
    }

    /// Mark the registry closed to new `create` calls. Existing sessions are
    /// unaffected until `close_all` tears them down.
    pub fn mark_closed(&self) {
        self.closing.store(true, Ordering::Release);
    }

    /// Fetch a handle to a session without holding the registry lock while
    /// its operation runs.
    async fn get(&self, name: &str) -> RecResult<Arc<Mutex<Session>>> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(name)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| RecError::SessionNotFound(name.to_string()))
    }

    pub async fn run(&self, name: &str, action: SessionAction, config: &Config) -> RecResult<SessionRunResult> {
        let handle = self.get(name).await?;
        let mut session = handle.lock().await;
        session.run(action, config).await
    }

    /// Deliver `SIGINT` to the session's foreground process group. Reads
    /// only the stable `pid` recorded at creation, so this never blocks on a
    /// `run` in flight on the same session, per §5.
    pub async fn interrupt(&self, name: &str) -> RecResult<()> {
        let pid = {
            let sessions = self.sessions.lock().await;
            sessions
                .get(name)
                .map(|entry| entry.pid)
                .ok_or_else(|| RecError::SessionNotFound(name.to_string()))?
        };
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(-pid), nix::sys::signal::Signal::SIGINT)
            .map_err(|e| RecError::Internal(format!("signal delivery failed: {e}")))
    }

    /// Close a session and remove it from the map only after its `close()`
    /// completes, so a concurrent `get` either sees a live session or
    /// `SESSION_NOT_FOUND` -- never a half-torn-down entry. Idempotent: a
    /// name that is already gone is a successful no-op (§7: close is always
    /// idempotent).
    pub async fn close(&self, name: &str) -> RecResult<()> {
        let entry = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(name)
        };
        if let Some(entry) = entry {
            let mut session = entry.session.lock().await;
            session.close().await?;
        }
        Ok(())
    }

    /// Tear down every live session, bounded by `deadline`. Used by the
    /// supervisor (C8) on shutdown.
    pub async fn close_all(&self, deadline: std::time::Duration) {
        self.mark_closed();
        let handles: Vec<_> = {
            let mut sessions = self.sessions.lock().await;
            sessions.drain().map(|(_, entry)| entry.session).collect()
        };
        let closes = handles.into_iter().map(|handle| async move {
            let mut session = handle.lock().await;
            let _ = session.close().await;
        });
        let _ = tokio::time::timeout(deadline, futures_join_all(closes)).await;
    }

    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.lock().await;
        let mut out = Vec::with_capacity(sessions.len());
        for (name, entry) in sessions.iter() {
            let session = entry.session.lock().await;
            out.push(SessionSummary {
                name: name.clone(),
                kind: session.kind().to_string(),
                alive: session.state() != crate::session::SessionState::Closed,
                created_at: session.created_at(),
                last_activity: session.last_activity(),
            });
        }
        out
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Minimal join-all so we don't pull in the `futures` crate for one call
/// site; everything here already runs on the `tokio` runtime.
async fn futures_join_all<F: std::future::Future<Output = ()> + Send + 'static>(futs: impl IntoIterator<Item = F>) {
    let handles: Vec<_> = futs.into_iter().map(tokio::spawn).collect();
    for handle in handles {
        let _ = handle.await;
    }
}
