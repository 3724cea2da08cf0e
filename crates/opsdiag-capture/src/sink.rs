//! Capture sinks.
//!
//! A file sink is always placed under a fixed output directory; the caller
//! only names the file. Writing goes through a temporary file in the same
//! directory that is persisted without clobbering, so two concurrent
//! captures can never interleave into, or overwrite, the same file.

use regex::Regex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use opsdiag_core::{Result, SupportError};

/// Accepted sink file names.
pub const FILE_NAME_PATTERN: &str = r"^[A-Za-z0-9._-]{1,255}$";

#[allow(clippy::expect_used)]
static FILE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(FILE_NAME_PATTERN).expect("file name pattern is a valid literal"));

/// Where a capture goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Sink {
    /// Returned to the caller as text.
    #[default]
    Console,
    /// Written to `<output dir>/<name>`.
    File(String),
}

impl Sink {
    /// Returns the file name of a file sink.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Console => None,
            Self::File(name) => Some(name),
        }
    }
}

/// Rejects names with path separators, relative components or odd bytes.
///
/// # Errors
/// [`SupportError::InvalidFileName`].
pub fn validate_file_name(name: &str) -> Result<()> {
    if name == "." || name == ".." || !FILE_NAME.is_match(name) {
        return Err(SupportError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// Ensures `dir` exists as a directory.
///
/// A regular file occupying the path is removed first.
///
/// # Errors
/// [`SupportError::Storage`] if the directory cannot be created.
pub fn prepare_dir(dir: &Path) -> Result<()> {
    let result = (|| -> std::io::Result<()> {
        match std::fs::symlink_metadata(dir) {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => std::fs::remove_file(dir)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        std::fs::create_dir_all(dir)
    })();

    result.map_err(|e| {
        tracing::error!(dir = %dir.display(), error = %e, "cannot prepare output directory");
        SupportError::storage(format!("failed to check or create dir:{}", dir.display()))
    })
}

/// Writes `contents` to `dir/name`, failing if the file already exists.
///
/// # Errors
/// [`SupportError::InvalidFileName`] or [`SupportError::Storage`].
pub fn write_exclusive(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf> {
    validate_file_name(name)?;
    prepare_dir(dir)?;

    let target = dir.join(name);
    let storage = |e: std::io::Error| {
        tracing::error!(file = %target.display(), error = %e, "sink write failed");
        SupportError::storage(format!("failed to open file error:{e} file:{}", target.display()))
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".opsdiag-")
        .tempfile_in(dir)
        .map_err(storage)?;
    tmp.write_all(contents).map_err(storage)?;
    tmp.as_file().sync_all().map_err(storage)?;
    tmp.persist_noclobber(&target).map_err(|e| storage(e.error))?;

    tracing::info!(file = %target.display(), bytes = contents.len(), "capture written");
    Ok(target)
}

/// Runs [`write_exclusive`] on the blocking pool.
///
/// # Errors
/// As [`write_exclusive`].
pub async fn persist(dir: PathBuf, name: String, contents: Vec<u8>) -> Result<PathBuf> {
    tokio::task::spawn_blocking(move || write_exclusive(&dir, &name, &contents))
        .await
        .map_err(|e| SupportError::internal(format!("sink writer task failed: {e}")))?
}
