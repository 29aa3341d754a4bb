//! Closed set of request/response shapes for every endpoint in §6.
//!
//! Per Design Note 2 ("Dynamic request objects... a port should define a
//! closed set of request/response shapes... and validate once at the HTTP
//! boundary"), nothing downstream of these structs ever sees a raw
//! `serde_json::Value` -- deserialization failure is a `BAD_REQUEST` before
//! any session, process, or file operation runs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CommandArg {
    Argv(Vec<String>),
    Single(String),
}

impl CommandArg {
    pub fn into_argv(self, shell: bool) -> Vec<String> {
        match self {
            CommandArg::Argv(v) => v,
            CommandArg::Single(s) => {
                if shell {
                    vec![s]
                } else {
                    s.split_whitespace().map(str::to_string).collect()
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub session: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub working_directory: Option<String>,
    /// A command run once right after the session reaches its first prompt,
    /// e.g. sourcing project environment files.
    #[serde(default)]
    pub startup_source: Option<String>,
    #[serde(default)]
    pub startup_timeout: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_type: String,
}

#[derive(Debug, Deserialize)]
pub struct RunInSessionRequest {
    pub session: String,
    pub command: String,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub is_interactive_command: bool,
    #[serde(default)]
    pub expect: Option<String>,
    #[serde(default)]
    pub check: bool,
}

#[derive(Debug, Serialize)]
pub struct RunInSessionResponse {
    pub output: String,
    pub exit_code: i32,
    pub failure_reason: String,
    pub expect_string: String,
    pub session_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionNameRequest {
    pub session: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub command: CommandArg,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub shell: bool,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReadFileRequest {
    pub path: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub errors: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReadFileResponse {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct WriteFileRequest {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub create_parents: bool,
}

#[derive(Debug, Serialize)]
pub struct IsAliveResponse {
    pub is_alive: bool,
}

#[derive(Debug, Serialize)]
pub struct HelloResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize, Default)]
pub struct Empty {}
