//! Sentinel Protocol (C2): frame a command between a unique prompt and an
//! exit-code marker so a Session can detect completion on an arbitrary byte
//! stream, independent of shell-specific behavior or timing.
//!
//! Grounded on the teacher's marker-based command framing in
//! `session.rs::ShellSession::exec` (there: `__AGENTSH_START_<uuid>__` /
//! `__AGENTSH_END_<uuid>_<code>__`) and its ANSI stripping in `output.rs`.
//! REC's framing follows spec §4.2 exactly: a single prompt sentinel bound to
//! the session's lifetime (`PS1_UNIQUE`) plus a per-command exit-code marker,
//! rather than a fresh start/end marker pair per command -- the prompt
//! reappearing IS the end-of-command signal the real shell gives us for free.

use regex::Regex;
use std::sync::LazyLock;

pub const EXIT_SENTINEL_PRE: &str = "__EXIT__";
pub const EXIT_SENTINEL_POST: &str = "__END__";

static EXIT_SENTINEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "{}(-?\\d+){}",
        regex::escape(EXIT_SENTINEL_PRE),
        regex::escape(EXIT_SENTINEL_POST)
    ))
    .expect("exit sentinel regex is well-formed")
});

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\x1b\[[0-9;?<=>!]*[a-zA-Z~]|\x1b\][^\x07]*\x07|\x1b[()][0-9A-B]|\x1b[a-zA-Z]|.\x08",
    )
    .expect("ANSI escape regex is well-formed")
});

/// Generate a fresh `PS1_UNIQUE` for a session: unlikely to collide with
/// anything a command could legitimately print, and unique per session so
/// two sessions never confuse each other's prompts.
pub fn generate_ps1() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("SHELLPS1PREFIX{hex}SHELLPS1SUFFIX")
}

/// Build the exact bytes written to the PTY for a user command, per §4.2:
/// `C ; echo "<PRE>$?<POST>"\n`.
pub fn frame_command(command: &str) -> String {
    format!("{command} ; echo \"{EXIT_SENTINEL_PRE}$?{EXIT_SENTINEL_POST}\"\n")
}

/// Strip ANSI escape sequences from PTY output so callers see visible text
/// only, the way a terminal emulator would render it.
pub fn strip_ansi(s: &str) -> String {
    ANSI_ESCAPE.replace_all(s, "").to_string()
}

/// Normalize `\r\n` to `\n` and strip the echoed command line (its first
/// line, if the shell echoed it back verbatim) from accumulated output.
///
/// The line discipline echoes back exactly the bytes written to the PTY,
/// which is the *framed* command (`frame_command`'s output), not the bare
/// command text a caller submitted -- so that's what the first line is
/// compared against.
pub fn normalize_output(raw: &str, submitted_command: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let framed = frame_command(submitted_command);
    let first_line_end = unified.find('\n').unwrap_or(unified.len());
    let first_line = &unified[..first_line_end];
    if first_line.trim() == framed.trim() {
        unified[first_line_end..].trim_start_matches('\n').to_string()
    } else {
        unified
    }
}

/// Where, in the accumulating output buffer, the exit-sentinel line begins
/// and ends, plus the parsed exit code. The caller scans the buffer as it
/// grows rather than assuming line-buffered reads, per §9's design note.
pub struct ExitMatch {
    pub start: usize,
    pub end: usize,
    pub exit_code: i32,
}

pub fn find_exit_sentinel(buf: &str) -> Option<ExitMatch> {
    let m = EXIT_SENTINEL_RE.captures(buf)?;
    let whole = m.get(0)?;
    let code = m.get(1)?.as_str().parse::<i32>().ok()?;
    Some(ExitMatch {
        start: whole.start(),
        end: whole.end(),
        exit_code: code,
    })
}

/// First index at which `pattern` appears in `buf` after `after`, searching
/// from scratch each call (buffers here are bounded by a single command's
/// output, not unbounded streams, so this is cheap enough to call per byte
/// chunk).
pub fn find_from(buf: &str, pattern: &str, after: usize) -> Option<usize> {
    if after > buf.len() {
        return None;
    }
    buf[after..].find(pattern).map(|pos| pos + after)
}

/// Compile a caller-supplied `expect` regex, the alternative sentinel for
/// interactive sub-REPLs (§4.2's "Alternative sentinel").
pub fn compile_expect(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(pattern)
}
