//! Supportability configuration.
//!
//! Configuration is validated at load time, every field has a default that
//! matches the device filesystem layout, and durations are written as
//! human-readable strings (`"10s"`, `"6m"`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SupportError};
use crate::types::Severity;

/// Top-level configuration for the supportability subsystem.
///
/// # Toyota Way: Standardized Work (標準作業)
/// One file describes every fixed path and every bounded budget the
/// subsystem uses, so the same binary runs against a device image or a
/// test directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportConfig {
    /// Filesystem layout.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Deadlines for daemon contact.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Event log sizing.
    #[serde(default)]
    pub event_log: EventLogConfig,

    /// Core dump capture and retention.
    #[serde(default)]
    pub core_dump: CoreDumpConfig,

    /// Remote log forwarding.
    #[serde(default)]
    pub forwarder: ForwarderConfig,

    /// Feature registry behavior.
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl SupportConfig {
    /// Returns a configuration whose every path lives under `root`.
    ///
    /// The relative layout mirrors the device layout.
    #[must_use]
    pub fn rooted_at(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            paths: PathsConfig {
                feature_mapping: root.join("etc/ops_featuremapping.yaml"),
                showtech_mapping: root.join("etc/ops_showtech.yaml"),
                diag_dir: root.join("ops-diag"),
                showtech_dir: root.join("showtech"),
                core_dir: root.join("coredump"),
                core_spool_dir: root.join("coredump/spool"),
                run_dir: root.join("run"),
                syslog_socket: root.join("run/opsdiag-syslog.sock"),
                control_socket: root.join("run/opsdiagd.ctl"),
                event_log_file: root.join("log/event.log"),
            },
            ..Self::default()
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if any bound is zero or the budgets are inconsistent.
    pub fn validate(&self) -> Result<()> {
        self.paths.validate()?;
        self.timeouts.validate()?;

        if self.event_log.capacity == 0 {
            return Err(SupportError::config("event_log.capacity must be > 0"));
        }
        if self.core_dump.max_count == 0 {
            return Err(SupportError::config("core_dump.max_count must be > 0"));
        }
        if self.forwarder.queue_depth == 0 {
            return Err(SupportError::config("forwarder.queue_depth must be > 0"));
        }
        if self.forwarder.reconnect_initial > self.forwarder.reconnect_max {
            return Err(SupportError::config(
                "forwarder.reconnect_initial cannot exceed reconnect_max",
            ));
        }

        Ok(())
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SupportError::config(format!("failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    /// Returns an error if the text cannot be parsed or validated.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SupportError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

/// Fixed filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Diag-dump feature to daemon mapping.
    #[serde(default = "default_feature_mapping")]
    pub feature_mapping: PathBuf,

    /// Show tech feature to command mapping.
    #[serde(default = "default_showtech_mapping")]
    pub showtech_mapping: PathBuf,

    /// Directory for diag-dump file sinks.
    #[serde(default = "default_diag_dir")]
    pub diag_dir: PathBuf,

    /// Directory for show tech file sinks.
    #[serde(default = "default_showtech_dir")]
    pub showtech_dir: PathBuf,

    /// Directory holding compressed core files.
    #[serde(default = "default_core_dir")]
    pub core_dir: PathBuf,

    /// Directory where raw core images are spooled by the core handler.
    #[serde(default = "default_core_spool_dir")]
    pub core_spool_dir: PathBuf,

    /// Directory containing daemon control sockets and pid files.
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,

    /// Local syslog ingress datagram socket.
    #[serde(default = "default_syslog_socket")]
    pub syslog_socket: PathBuf,

    /// Control socket of the management process itself.
    #[serde(default = "default_control_socket")]
    pub control_socket: PathBuf,

    /// Rendered event records are appended here. Empty disables the file.
    #[serde(default = "default_event_log_file")]
    pub event_log_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            feature_mapping: default_feature_mapping(),
            showtech_mapping: default_showtech_mapping(),
            diag_dir: default_diag_dir(),
            showtech_dir: default_showtech_dir(),
            core_dir: default_core_dir(),
            core_spool_dir: default_core_spool_dir(),
            run_dir: default_run_dir(),
            syslog_socket: default_syslog_socket(),
            control_socket: default_control_socket(),
            event_log_file: default_event_log_file(),
        }
    }
}

impl PathsConfig {
    fn validate(&self) -> Result<()> {
        let dirs = [
            ("diag_dir", &self.diag_dir),
            ("showtech_dir", &self.showtech_dir),
            ("core_dir", &self.core_dir),
            ("run_dir", &self.run_dir),
        ];
        for (name, path) in dirs {
            if path.as_os_str().is_empty() {
                return Err(SupportError::config(format!("paths.{name} cannot be empty")));
            }
        }
        Ok(())
    }
}

fn default_feature_mapping() -> PathBuf {
    PathBuf::from("/etc/openswitch/supportability/ops_featuremapping.yaml")
}

fn default_showtech_mapping() -> PathBuf {
    PathBuf::from("/etc/openswitch/supportability/ops_showtech.yaml")
}

fn default_diag_dir() -> PathBuf {
    PathBuf::from("/tmp/ops-diag")
}

fn default_showtech_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_core_dir() -> PathBuf {
    PathBuf::from("/var/diagnostics/coredump")
}

fn default_core_spool_dir() -> PathBuf {
    PathBuf::from("/var/diagnostics/coredump/spool")
}

fn default_run_dir() -> PathBuf {
    PathBuf::from("/var/run/openvswitch")
}

fn default_syslog_socket() -> PathBuf {
    PathBuf::from("/var/run/opsdiag-syslog.sock")
}

fn default_control_socket() -> PathBuf {
    PathBuf::from("/var/run/openvswitch/opsdiagd.ctl")
}

fn default_event_log_file() -> PathBuf {
    PathBuf::from("/var/log/event.log")
}

/// Deadlines for every cross-process call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Per-daemon deadline for a diag-dump capture.
    #[serde(default = "default_diag_dump_timeout")]
    #[serde(with = "humantime_serde")]
    pub diag_dump: Duration,

    /// Per-command deadline inside a show tech run.
    #[serde(default = "default_show_tech_command_timeout")]
    #[serde(with = "humantime_serde")]
    pub show_tech_command: Duration,

    /// Overall budget for one show tech run.
    #[serde(default = "default_show_tech_total_timeout")]
    #[serde(with = "humantime_serde")]
    pub show_tech_total: Duration,

    /// Deadline for vlog and debug control requests.
    #[serde(default = "default_control_timeout")]
    #[serde(with = "humantime_serde")]
    pub control: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            diag_dump: default_diag_dump_timeout(),
            show_tech_command: default_show_tech_command_timeout(),
            show_tech_total: default_show_tech_total_timeout(),
            control: default_control_timeout(),
        }
    }
}

impl TimeoutsConfig {
    fn validate(&self) -> Result<()> {
        if self.diag_dump.is_zero() || self.show_tech_command.is_zero() || self.control.is_zero()
        {
            return Err(SupportError::config("timeouts must be non-zero"));
        }
        if self.show_tech_total < self.show_tech_command {
            return Err(SupportError::config(
                "timeouts.show_tech_total cannot be shorter than show_tech_command",
            ));
        }
        Ok(())
    }
}

fn default_diag_dump_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_show_tech_command_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_show_tech_total_timeout() -> Duration {
    Duration::from_secs(360)
}

fn default_control_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Event log sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogConfig {
    /// Number of records kept before the oldest is evicted.
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

fn default_event_capacity() -> usize {
    1024
}

/// Core dump capture and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreDumpConfig {
    /// Maximum number of core files kept.
    #[serde(default = "default_core_max_count")]
    pub max_count: usize,

    /// Maximum age of a core file.
    #[serde(default = "default_core_max_age")]
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,

    /// How long to wait for a raw core image to appear in the spool.
    #[serde(default = "default_capture_window")]
    #[serde(with = "humantime_serde")]
    pub capture_window: Duration,

    /// How often supervised children are polled for exit.
    #[serde(default = "default_poll_interval")]
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Per-block acknowledgment deadline for TFTP copy-out.
    #[serde(default = "default_tftp_timeout")]
    #[serde(with = "humantime_serde")]
    pub tftp_timeout: Duration,

    /// Retransmissions per TFTP block before giving up.
    #[serde(default = "default_tftp_retries")]
    pub tftp_retries: u32,
}

impl Default for CoreDumpConfig {
    fn default() -> Self {
        Self {
            max_count: default_core_max_count(),
            max_age: default_core_max_age(),
            capture_window: default_capture_window(),
            poll_interval: default_poll_interval(),
            tftp_timeout: default_tftp_timeout(),
            tftp_retries: default_tftp_retries(),
        }
    }
}

fn default_core_max_count() -> usize {
    16
}

fn default_core_max_age() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_capture_window() -> Duration {
    Duration::from_secs(2)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_tftp_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_tftp_retries() -> u32 {
    5
}

/// Remote log forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// Per-target queue depth; lines beyond it are dropped.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// First TCP reconnect delay.
    #[serde(default = "default_reconnect_initial")]
    #[serde(with = "humantime_serde")]
    pub reconnect_initial: Duration,

    /// Maximum TCP reconnect delay.
    #[serde(default = "default_reconnect_max")]
    #[serde(with = "humantime_serde")]
    pub reconnect_max: Duration,

    /// Hostname written into forwarded lines. Defaults to the system hostname.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Minimum severity of the process's own tracing events to forward.
    #[serde(default = "default_forward_threshold")]
    pub tracing_threshold: Severity,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
            reconnect_initial: default_reconnect_initial(),
            reconnect_max: default_reconnect_max(),
            hostname: None,
            tracing_threshold: default_forward_threshold(),
        }
    }
}

fn default_queue_depth() -> usize {
    1024
}

fn default_reconnect_initial() -> Duration {
    Duration::from_millis(200)
}

fn default_reconnect_max() -> Duration {
    Duration::from_secs(30)
}

fn default_forward_threshold() -> Severity {
    Severity::Info
}

/// Feature registry behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Reload mapping files when their metadata changes.
    #[serde(default)]
    pub reload_on_change: bool,
}

/// Humantime serialization for Duration.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
