//! File Service (C6): read/write whole files with a caller-chosen text
//! encoding and error policy, per §4.6.
//!
//! Not grounded on the teacher, which has no file surface at all -- this
//! module follows the atomic-write idiom (temp file in the same directory,
//! then rename) that `tempfile::NamedTempFile` exists to make safe, the way
//! `lelanhus-ptybox` and `stakpak-agent` both pull `tempfile` into their
//! dependency stacks for exactly this kind of filesystem work.

use crate::error::{RecError, RecResult};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorPolicy {
    Strict,
    Replace,
    Ignore,
}

impl DecodeErrorPolicy {
    pub fn parse(s: Option<&str>) -> RecResult<Self> {
        match s.unwrap_or("strict") {
            "strict" => Ok(Self::Strict),
            "replace" => Ok(Self::Replace),
            "ignore" => Ok(Self::Ignore),
            other => Err(RecError::BadRequest(format!("unknown error policy '{other}'"))),
        }
    }
}

/// Read the whole file at `path`, decoded with `encoding` (an
/// `encoding_rs`-recognized label; defaults to `"utf-8"`) and `errors`.
pub async fn read_file(path: &str, encoding: Option<&str>, errors: Option<&str>) -> RecResult<String> {
    let path = path.to_string();
    let encoding_label = encoding.unwrap_or("utf-8").to_string();
    let policy = DecodeErrorPolicy::parse(errors)?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| classify_io_error(&path, e))?;

    let encoding_rs = encoding_rs::Encoding::for_label(encoding_label.as_bytes())
        .ok_or_else(|| RecError::BadRequest(format!("unknown encoding '{encoding_label}'")))?;

    let (decoded, _, had_errors) = encoding_rs.decode(&bytes);
    if had_errors && policy == DecodeErrorPolicy::Strict {
        return Err(RecError::DecodeError(format!(
            "could not decode '{path}' as {encoding_label}"
        )));
    }

    match policy {
        DecodeErrorPolicy::Ignore => Ok(decoded.chars().filter(|c| *c != '\u{FFFD}').collect()),
        _ => Ok(decoded.into_owned()),
    }
}

/// Read the whole file as raw bytes, base64-encoded -- the binary-safe path
/// spec §8 property 8 requires, since JSON strings cannot carry arbitrary
/// bytes.
pub async fn read_file_base64(path: &str) -> RecResult<String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| classify_io_error(path, e))?;
    Ok(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes))
}

fn classify_io_error(path: &str, err: std::io::Error) -> RecError {
    match err.kind() {
        std::io::ErrorKind::NotFound => RecError::FileNotFound(path.to_string()),
        std::io::ErrorKind::PermissionDenied => RecError::PermissionDenied(path.to_string()),
        _ if err.raw_os_error() == Some(libc_eisdir()) => RecError::IsDirectory(path.to_string()),
        _ => RecError::Internal(format!("reading '{path}': {err}")),
    }
}

/// `EISDIR`'s numeric value on Linux, used since `std::io::ErrorKind` has no
/// stable "is a directory" variant yet.
fn libc_eisdir() -> i32 {
    21
}

/// Overwrite `path` with `content`, writing to a temp file in the same
/// directory first and renaming over the target so readers never observe a
/// partial write, per §4.6.
pub async fn write_file(path: &str, content: &[u8], create_parents: bool) -> RecResult<()> {
    let path = path.to_string();
    let content = content.to_vec();
    tokio::task::spawn_blocking(move || write_file_blocking(&path, &content, create_parents))
        .await
        .map_err(|e| RecError::Internal(format!("write task panicked: {e}")))?
}

fn write_file_blocking(path: &str, content: &[u8], create_parents: bool) -> RecResult<()> {
    let target = Path::new(path);
    let parent = target.parent().filter(|p| !p.as_os_str().is_empty());

    if let Some(parent) = parent {
        if create_parents {
            std::fs::create_dir_all(parent)
                .map_err(|e| RecError::Internal(format!("creating '{}': {e}", parent.display())))?;
        } else if !parent.exists() {
            return Err(RecError::NotADirectory(parent.display().to_string()));
        }
    }

    if target.is_dir() {
        return Err(RecError::IsDirectory(path.to_string()));
    }

    let dir = parent.unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| RecError::PermissionDenied(format!("creating temp file in '{}': {e}", dir.display())))?;
    tmp.write_all(content)
        .map_err(|e| RecError::Internal(format!("writing temp file: {e}")))?;
    tmp.persist(target)
        .map_err(|e| RecError::PermissionDenied(format!("renaming into place: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_utf8_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        let path_str = path.to_str().unwrap();

        write_file(path_str, "hello\nworld".as_bytes(), false).await.unwrap();
        let content = read_file(path_str, None, None).await.unwrap();
        assert_eq!(content, "hello\nworld");
    }

    #[tokio::test]
    async fn round_trips_arbitrary_bytes_via_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let path_str = path.to_str().unwrap();
        let bytes: Vec<u8> = (0..=255).collect();

        write_file(path_str, &bytes, false).await.unwrap();
        let encoded = read_file_base64(path_str).await.unwrap();
        let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &encoded).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[tokio::test]
    async fn missing_file_is_file_not_found() {
        let err = read_file("/nonexistent/path/does-not-exist", None, None).await;
        assert!(matches!(err, Err(RecError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn write_without_create_parents_fails_on_missing_dir() {
        let err = write_file("/nonexistent/missing-dir/file.txt", b"x", false).await;
        assert!(matches!(err, Err(RecError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn write_with_create_parents_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/file.txt");
        let path_str = path.to_str().unwrap();

        write_file(path_str, b"ok", true).await.unwrap();
        let content = read_file(path_str, None, None).await.unwrap();
        assert_eq!(content, "ok");
    }

    #[tokio::test]
    async fn reading_a_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_file(dir.path().to_str().unwrap(), None, None).await;
        assert!(matches!(err, Err(RecError::IsDirectory(_))));
    }
}
