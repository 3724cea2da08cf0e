//! Core dump registry.
//!
//! Compressed cores live in one directory as `core.<daemon>.<instance>.gz`.
//! The registry indexes that directory at startup, assigns instance ids
//! strictly above anything already on disk, and applies the count and age
//! retention bounds after every capture.

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::write::GzEncoder;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use opsdiag_core::is_valid_daemon_name;

use crate::error::{CrashError, Result};

/// Extension of compressed core files.
pub const CORE_EXTENSION: &str = "gz";

/// Printed by `show core-dump` when nothing is held.
pub const NO_CORE_MESSAGE: &str = "No core dumps are present";

/// One captured core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreDumpRecord {
    /// Daemon that crashed.
    pub daemon: String,
    /// Unique per crash occurrence.
    pub instance_id: u64,
    /// Terminating signal, when known.
    pub signal: Option<i32>,
    /// Pid of the crashed process, when known.
    pub pid: Option<u32>,
    /// Compressed core file.
    pub path: PathBuf,
    /// Compressed size.
    pub size_bytes: u64,
    /// Capture time.
    pub created_at: DateTime<Utc>,
}

/// Count and age bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Oldest records beyond this count are removed.
    pub max_count: usize,
    /// Records older than this are removed.
    pub max_age: Duration,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            max_count: 16,
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// File name of a core.
#[must_use]
pub fn core_file_name(daemon: &str, instance_id: u64) -> String {
    format!("core.{daemon}.{instance_id}.{CORE_EXTENSION}")
}

/// Parses `core.<daemon>.<instance>.gz`.
#[must_use]
pub fn parse_core_file_name(name: &str) -> Option<(String, u64)> {
    let stem = name
        .strip_prefix("core.")?
        .strip_suffix(CORE_EXTENSION)?
        .strip_suffix('.')?;
    let (daemon, id) = stem.rsplit_once('.')?;
    if daemon.is_empty() {
        return None;
    }
    Some((daemon.to_string(), id.parse().ok()?))
}

/// Registry of captured cores.
///
/// Appends come from the monitor task, reads from CLI queries; both take the
/// record lock only to copy in or out.
#[derive(Debug)]
pub struct CoreDumpRegistry {
    dir: PathBuf,
    retention: Retention,
    records: RwLock<Vec<CoreDumpRecord>>,
    next_instance: AtomicU64,
}

impl CoreDumpRegistry {
    /// Opens `dir`, creating it if needed, and indexes existing cores.
    ///
    /// # Errors
    /// [`CrashError::Io`] if the directory cannot be created or read.
    pub fn open(dir: impl Into<PathBuf>, retention: Retention) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some((daemon, instance_id)) = parse_core_file_name(&name.to_string_lossy()) else {
                continue;
            };
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let created_at = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            records.push(CoreDumpRecord {
                daemon,
                instance_id,
                signal: None,
                pid: None,
                path: entry.path(),
                size_bytes: meta.len(),
                created_at,
            });
        }
        records.sort_by_key(|r| r.instance_id);

        let next = records.last().map_or(1, |r| r.instance_id + 1);
        tracing::info!(dir = %dir.display(), indexed = records.len(), next_instance = next, "core dump registry opened");

        Ok(Self {
            dir,
            retention,
            records: RwLock::new(records),
            next_instance: AtomicU64::new(next),
        })
    }

    /// Returns the core directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserves the next instance id.
    pub fn next_instance_id(&self) -> u64 {
        self.next_instance.fetch_add(1, Ordering::Relaxed)
    }

    /// Compresses `raw` into a new core file and registers it.
    ///
    /// Blocking; call from a blocking context.
    ///
    /// # Errors
    /// [`CrashError::InvalidDaemon`] for a name that is not a plain file
    /// name component, [`CrashError::Storage`] if the file cannot be written.
    pub fn store(
        &self,
        daemon: &str,
        signal: Option<i32>,
        pid: Option<u32>,
        raw: &mut dyn Read,
    ) -> Result<CoreDumpRecord> {
        if !is_valid_daemon_name(daemon) {
            return Err(CrashError::InvalidDaemon(daemon.to_string()));
        }
        let instance_id = self.next_instance_id();
        let path = self.dir.join(core_file_name(daemon, instance_id));

        let size_bytes = write_compressed(&self.dir, &path, raw).map_err(|e| {
            let _ = std::fs::remove_file(&path);
            CrashError::storage(format!("cannot write {}: {e}", path.display()))
        })?;

        let record = CoreDumpRecord {
            daemon: daemon.to_string(),
            instance_id,
            signal,
            pid,
            path,
            size_bytes,
            created_at: Utc::now(),
        };
        self.records.write().push(record.clone());
        tracing::info!(daemon = %daemon, instance_id, size_bytes, "core dump stored");

        self.enforce_retention(Utc::now());
        Ok(record)
    }

    /// Removes records beyond the count bound or the age bound.
    ///
    /// Returns the removed records.
    pub fn enforce_retention(&self, now: DateTime<Utc>) -> Vec<CoreDumpRecord> {
        let max_age = chrono::Duration::from_std(self.retention.max_age)
            .unwrap_or_else(|_| chrono::Duration::days(36500));
        let expired = {
            let mut records = self.records.write();
            let (mut kept, mut expired): (Vec<_>, Vec<_>) = records
                .drain(..)
                .partition(|r| now.signed_duration_since(r.created_at) <= max_age);
            if kept.len() > self.retention.max_count {
                let excess = kept.len() - self.retention.max_count;
                expired.extend(kept.drain(..excess));
            }
            *records = kept;
            expired
        };

        for record in &expired {
            if let Err(e) = std::fs::remove_file(&record.path) {
                tracing::warn!(path = %record.path.display(), error = %e, "cannot remove expired core");
            } else {
                tracing::info!(daemon = %record.daemon, instance_id = record.instance_id, "core dump expired");
            }
        }
        expired
    }

    /// All records in instance order.
    #[must_use]
    pub fn list(&self) -> Vec<CoreDumpRecord> {
        self.records.read().clone()
    }

    /// Records of one daemon.
    #[must_use]
    pub fn list_for(&self, daemon: &str) -> Vec<CoreDumpRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.daemon == daemon)
            .cloned()
            .collect()
    }

    /// Finds one record.
    ///
    /// # Errors
    /// [`CrashError::NotFound`].
    pub fn find(&self, daemon: &str, instance_id: u64) -> Result<CoreDumpRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.daemon == daemon && r.instance_id == instance_id)
            .cloned()
            .ok_or_else(|| CrashError::NotFound {
                daemon: daemon.to_string(),
                instance_id,
            })
    }

    /// Deletes one core and its record.
    ///
    /// # Errors
    /// [`CrashError::NotFound`], or [`CrashError::Io`] if the file cannot be
    /// removed.
    pub fn remove(&self, daemon: &str, instance_id: u64) -> Result<CoreDumpRecord> {
        let record = {
            let mut records = self.records.write();
            let idx = records
                .iter()
                .position(|r| r.daemon == daemon && r.instance_id == instance_id)
                .ok_or_else(|| CrashError::NotFound {
                    daemon: daemon.to_string(),
                    instance_id,
                })?;
            records.remove(idx)
        };
        match std::fs::remove_file(&record.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(daemon = %daemon, instance_id, "core dump removed");
        Ok(record)
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn write_compressed(dir: &Path, path: &Path, raw: &mut dyn Read) -> std::io::Result<u64> {
    std::fs::create_dir_all(dir)?;
    let file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    std::io::copy(raw, &mut encoder)?;
    let mut file = encoder.finish()?;
    file.flush()?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

/// Renders `show core-dump`.
#[must_use]
pub fn render_table(records: &[CoreDumpRecord]) -> String {
    if records.is_empty() {
        return format!("{NO_CORE_MESSAGE}\n");
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<24} {:<12} {:<28} {:<20} {:>12}",
        "Daemon Name", "Instance ID", "Crash Reason", "Timestamp", "Size"
    );
    let _ = writeln!(out, "{}", "=".repeat(100));
    for r in records {
        let reason = r
            .signal
            .map_or("-", opsdiag_core::signal_name);
        let _ = writeln!(
            out,
            "{:<24} {:<12} {:<28} {:<20} {:>12}",
            r.daemon,
            r.instance_id,
            reason,
            r.created_at.format("%Y-%m-%d %H:%M:%S"),
            r.size_bytes
        );
    }
    let _ = writeln!(out, "{}", "=".repeat(100));
    let _ = writeln!(out, "Total number of core dumps : {}", records.len());
    out
}
