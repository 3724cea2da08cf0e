//! Crash monitor.
//!
//! Two detection sources feed one pipeline: supervised child processes
//! whose exit status carries a terminating signal, and crash reports
//! relayed by the kernel core pattern helper. Each report then walks
//! `Running -> Terminated -> EventEmitted -> CoreCaptured`.
//!
//! # Toyota Way: Jidoka (自働化)
//! A crashed daemon is detected and recorded automatically; nothing waits
//! for an operator to notice.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use opsdiag_core::types::CRASH_EVENT_CODE;
use opsdiag_core::{EventCategory, EventLog, Severity, is_valid_daemon_name, signal_name};

use crate::cores::{CoreDumpRecord, CoreDumpRegistry};
use crate::error::{CrashError, Result};

/// Depth of the crash report channel.
const REPORT_QUEUE: usize = 64;

/// Lifecycle of a monitored daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashState {
    /// Alive.
    Running,
    /// Killed by a signal; not yet recorded.
    Terminated,
    /// Crash event written to the event log.
    EventEmitted,
    /// Core file registered.
    CoreCaptured,
    /// Exited without a terminating signal.
    Exited,
}

/// A detected crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    /// Daemon name.
    pub daemon: String,
    /// Pid of the crashed process, if known.
    pub pid: Option<u32>,
    /// Terminating signal number.
    pub signal: i32,
    /// Raw core image, if the reporter already has one.
    pub core: Option<PathBuf>,
    /// Detection time.
    pub detected_at: DateTime<Utc>,
}

impl CrashReport {
    /// Creates a report detected now.
    #[must_use]
    pub fn new(daemon: impl Into<String>, pid: Option<u32>, signal: i32) -> Self {
        Self {
            daemon: daemon.into(),
            pid,
            signal,
            core: None,
            detected_at: Utc::now(),
        }
    }

    /// Attaches a raw core image path.
    #[must_use]
    pub fn with_core(mut self, core: impl Into<PathBuf>) -> Self {
        self.core = Some(core.into());
        self
    }

    /// Event log message for this crash.
    #[must_use]
    pub fn message(&self) -> String {
        format!("{} crashed due to {}", self.daemon, signal_name(self.signal))
    }
}

/// Monitor timing.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Where raw cores are spooled as `core.<pid>`.
    pub spool_dir: PathBuf,
    /// How long to wait for a raw core to appear.
    pub capture_window: Duration,
    /// Spool polling interval.
    pub poll_interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from("/var/diagnostics/coredump/spool"),
            capture_window: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Cloneable sender of crash reports.
#[derive(Debug, Clone)]
pub struct CrashReporter {
    tx: mpsc::Sender<CrashReport>,
}

impl CrashReporter {
    /// Queues a report, waiting for room.
    ///
    /// # Errors
    /// [`CrashError::Stopped`] if the monitor is gone.
    pub async fn report(&self, report: CrashReport) -> Result<()> {
        self.tx.send(report).await.map_err(|_| CrashError::Stopped)
    }

    /// Queues a report without waiting.
    ///
    /// # Errors
    /// [`CrashError::Stopped`] if the monitor is gone or its queue is full.
    pub fn try_report(&self, report: CrashReport) -> Result<()> {
        self.tx.try_send(report).map_err(|_| CrashError::Stopped)
    }
}

/// Background crash detector.
#[derive(Debug)]
pub struct CrashMonitor {
    events: Arc<EventLog>,
    cores: Arc<CoreDumpRegistry>,
    settings: MonitorSettings,
    tx: mpsc::Sender<CrashReport>,
    rx: Mutex<Option<mpsc::Receiver<CrashReport>>>,
    states: RwLock<HashMap<String, CrashState>>,
}

impl CrashMonitor {
    /// Creates a monitor recording into `events` and `cores`.
    #[must_use]
    pub fn new(
        events: Arc<EventLog>,
        cores: Arc<CoreDumpRegistry>,
        settings: MonitorSettings,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(REPORT_QUEUE);
        Arc::new(Self {
            events,
            cores,
            settings,
            tx,
            rx: Mutex::new(Some(rx)),
            states: RwLock::new(HashMap::new()),
        })
    }

    /// Returns a handle for relaying crash reports.
    #[must_use]
    pub fn reporter(&self) -> CrashReporter {
        CrashReporter {
            tx: self.tx.clone(),
        }
    }

    /// Returns the core registry.
    #[must_use]
    pub fn cores(&self) -> &Arc<CoreDumpRegistry> {
        &self.cores
    }

    /// Current state of `daemon`, if it was ever seen.
    #[must_use]
    pub fn state(&self, daemon: &str) -> Option<CrashState> {
        self.states.read().get(daemon).copied()
    }

    /// Captured cores in instance order.
    #[must_use]
    pub fn list_core_dumps(&self) -> Vec<CoreDumpRecord> {
        self.cores.list()
    }

    fn set_state(&self, daemon: &str, state: CrashState) {
        tracing::debug!(daemon = %daemon, state = ?state, "crash state");
        self.states.write().insert(daemon.to_string(), state);
    }

    /// Starts the report processing task.
    ///
    /// Returns `None` if it was already started.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut rx = self.rx.lock().take()?;
        let monitor = Arc::clone(self);
        Some(tokio::spawn(async move {
            while let Some(report) = rx.recv().await {
                monitor.handle(report).await;
            }
            tracing::debug!("crash monitor stopped");
        }))
    }

    /// Spawns `command` as daemon `name` and watches it for a crash.
    ///
    /// # Errors
    /// [`CrashError::Spawn`] if the process cannot be started.
    pub fn supervise(self: &Arc<Self>, name: &str, mut command: Command) -> Result<u32> {
        let mut child = command.kill_on_drop(true).spawn().map_err(|e| CrashError::Spawn {
            daemon: name.to_string(),
            reason: e.to_string(),
        })?;
        let pid = child.id().ok_or_else(|| CrashError::Spawn {
            daemon: name.to_string(),
            reason: "process has no PID".to_string(),
        })?;
        self.set_state(name, CrashState::Running);
        tracing::info!(daemon = %name, pid, "supervising daemon");

        let monitor = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => match status.signal() {
                    Some(signal) => {
                        monitor.set_state(&name, CrashState::Terminated);
                        if monitor
                            .reporter()
                            .report(CrashReport::new(&name, Some(pid), signal))
                            .await
                            .is_err()
                        {
                            tracing::error!(daemon = %name, "crash monitor stopped before report");
                        }
                    }
                    None => {
                        tracing::info!(daemon = %name, pid, code = ?status.code(), "daemon exited");
                        monitor.set_state(&name, CrashState::Exited);
                    }
                },
                Err(e) => tracing::error!(daemon = %name, pid, error = %e, "cannot wait for daemon"),
            }
        });
        Ok(pid)
    }

    async fn handle(&self, report: CrashReport) {
        if !is_valid_daemon_name(&report.daemon) {
            tracing::warn!(daemon = ?report.daemon, "dropping crash report with invalid daemon name");
            return;
        }
        self.set_state(&report.daemon, CrashState::Terminated);

        let message = report.message();
        tracing::error!(daemon = %report.daemon, pid = ?report.pid, signal = report.signal, "{message}");
        self.events.record_coded(
            EventCategory::Supportability,
            Severity::Crit,
            CRASH_EVENT_CODE,
            message,
        );
        self.set_state(&report.daemon, CrashState::EventEmitted);

        match self.capture(&report).await {
            Ok(record) => {
                self.set_state(&report.daemon, CrashState::CoreCaptured);
                tracing::info!(daemon = %record.daemon, instance_id = record.instance_id, "core captured");
            }
            Err(e) => {
                tracing::error!(daemon = %report.daemon, error = %e, "core capture failed");
            }
        }
    }

    /// Finds the raw core for `report`, waiting up to the capture window.
    ///
    /// Only regular files whose resolved path lies directly in the spool
    /// directory are taken; a reported path elsewhere is ignored in favor
    /// of `core.<pid>`.
    async fn raw_core(&self, report: &CrashReport) -> Option<PathBuf> {
        let spooled = report
            .pid
            .map(|pid| self.settings.spool_dir.join(format!("core.{pid}")));
        let candidate = match &report.core {
            Some(path) if self.names_spool_entry(path).await => path.clone(),
            Some(path) => {
                tracing::warn!(daemon = %report.daemon, path = %path.display(), "ignoring core outside the spool directory");
                spooled?
            }
            None => spooled?,
        };

        let deadline = tokio::time::Instant::now() + self.settings.capture_window;
        loop {
            if let Some(path) = self.in_spool(&candidate).await {
                if let Ok(meta) = tokio::fs::metadata(&path).await {
                    if meta.is_file() && meta.len() > 0 {
                        return Some(path);
                    }
                }
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::debug!(path = %candidate.display(), "no raw core within capture window");
                return None;
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    /// True if `path` is a file name directly under the spool directory.
    /// The file itself may not exist yet.
    async fn names_spool_entry(&self, path: &Path) -> bool {
        let (Some(parent), Some(_)) = (path.parent(), path.file_name()) else {
            return false;
        };
        match (
            tokio::fs::canonicalize(parent).await,
            tokio::fs::canonicalize(&self.settings.spool_dir).await,
        ) {
            (Ok(parent), Ok(spool)) => parent == spool,
            _ => false,
        }
    }

    /// Resolves `path` if it names an entry of the spool directory.
    async fn in_spool(&self, path: &Path) -> Option<PathBuf> {
        let spool = tokio::fs::canonicalize(&self.settings.spool_dir).await.ok()?;
        let resolved = tokio::fs::canonicalize(path).await.ok()?;
        (resolved.parent() == Some(spool.as_path())).then_some(resolved)
    }

    async fn capture(&self, report: &CrashReport) -> Result<CoreDumpRecord> {
        let raw = self.raw_core(report).await;
        let cores = Arc::clone(&self.cores);
        let report = report.clone();

        tokio::task::spawn_blocking(move || {
            let signal = Some(report.signal);
            match &raw {
                Some(path) => {
                    let mut file = std::fs::File::open(path)?;
                    let record = cores.store(&report.daemon, signal, report.pid, &mut file)?;
                    if let Err(e) = std::fs::remove_file(path) {
                        tracing::warn!(path = %path.display(), error = %e, "cannot remove spooled core");
                    }
                    Ok(record)
                }
                None => {
                    let summary = crash_summary(&report);
                    cores.store(&report.daemon, signal, report.pid, &mut summary.as_bytes())
                }
            }
        })
        .await
        .map_err(|e| CrashError::storage(format!("core capture task failed: {e}")))?
    }
}

fn crash_summary(report: &CrashReport) -> String {
    format!(
        "daemon: {}\npid: {}\nsignal: {} ({})\ntime: {}\ncore: not available\n",
        report.daemon,
        report.pid.map_or_else(|| "unknown".to_string(), |p| p.to_string()),
        report.signal,
        signal_name(report.signal),
        report.detected_at.to_rfc3339(),
    )
}
