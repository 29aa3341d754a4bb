//! Startup configuration: CLI flags and the tunables called out in spec §9.

use clap::Parser;

/// Remote Execution Core: drives interactive shell sessions, one-off
/// subprocess runs, and file transfer over an authenticated HTTP API.
#[derive(Debug, Clone, Parser)]
#[command(name = "remote", version)]
pub struct Config {
    /// Address to bind the HTTP listener on.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the HTTP listener on.
    #[arg(long, default_value_t = 8000)]
    pub port: u16,

    /// Bearer token clients must present. A random token is generated (and
    /// logged as a warning) when omitted -- fine for local development, never
    /// for anything reachable over a network.
    #[arg(long)]
    pub auth_token: Option<String>,

    /// Default per-command timeout (seconds) used when a session action omits
    /// `timeout` or supplies a non-positive value.
    #[arg(long, default_value_t = 300)]
    pub default_command_timeout: u64,

    /// Grace window (ms) given to the shell to re-emit its prompt after each
    /// SIGINT during timeout recovery (spec §4.3 steps 2 and 3).
    #[arg(long, default_value_t = 1000)]
    pub recovery_grace_ms: u64,

    /// Bounded deadline (ms) for the final resync read after `\x03` is
    /// written directly (spec §4.3 step 4).
    #[arg(long, default_value_t = 5000)]
    pub recovery_resync_ms: u64,

    /// Bound (ms) on how long graceful shutdown waits for `close_all` to
    /// finish tearing down sessions before the process exits anyway.
    #[arg(long, default_value_t = 5000)]
    pub shutdown_deadline_ms: u64,
}

/// Exit codes per spec §6.
#[repr(i32)]
pub enum ExitCode {
    Normal = 0,
    BindFailure = 1,
    AuthMisconfigured = 2,
}

impl Config {
    /// Resolve the auth token: a token was passed explicitly, none was
    /// passed (dev-mode random token, with a warning), or an empty string
    /// was passed explicitly -- the last is a misconfiguration, not an
    /// absence, and is reported as `Err` so the caller can exit 2 rather
    /// than silently running unauthenticated-by-accident.
    pub fn resolve_auth_token(&self) -> Result<String, ()> {
        match &self.auth_token {
            Some(token) if token.is_empty() => Err(()),
            Some(token) => Ok(token.clone()),
            None => {
                let token = uuid::Uuid::new_v4().to_string();
                tracing::warn!(
                    "no --auth-token supplied; generated a random dev token. \
                     Do not expose this port without setting a real token."
                );
                Ok(token)
            }
        }
    }
}
