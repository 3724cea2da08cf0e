//! Core value types shared by every supportability component.
//!
//! All CLI tokens (severities, categories, vlog levels and destinations) are
//! closed enumerations parsed with [`std::str::FromStr`]; an unknown token is
//! a [`SupportError::Syntax`] and never reaches an engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SupportError;

/// Event code carried by every crash event.
pub const CRASH_EVENT_CODE: u32 = 14001;

/// Maximum stored length of a feature name.
pub const FEATURE_NAME_MAX: usize = 30;

/// Maximum stored length of a feature description.
pub const FEATURE_DESC_MAX: usize = 100;

// =============================================================================
// Severity
// =============================================================================

/// Event severity, most severe first (syslog ordering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// System is unusable.
    Emer,
    /// Immediate action required.
    Alert,
    /// Critical condition.
    Crit,
    /// Error condition.
    Err,
    /// Warning condition.
    Warn,
    /// Normal but significant.
    Notice,
    /// Informational.
    Info,
    /// Debug-level message.
    Debug,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Self; 8] = [
        Self::Emer,
        Self::Alert,
        Self::Crit,
        Self::Err,
        Self::Warn,
        Self::Notice,
        Self::Info,
        Self::Debug,
    ];

    /// Returns the CLI token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Emer => "emer",
            Self::Alert => "alert",
            Self::Crit => "crit",
            Self::Err => "err",
            Self::Warn => "warn",
            Self::Notice => "notice",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }

    /// Returns the syslog numeric severity (0 = emergency).
    #[must_use]
    pub const fn as_syslog(&self) -> u8 {
        *self as u8
    }

    /// Returns true if `self` is as severe as `threshold` or more.
    #[must_use]
    pub fn is_at_least(&self, threshold: Self) -> bool {
        *self <= threshold
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = SupportError;

    fn from_str(s: &str) -> Result<Self, SupportError> {
        Self::ALL
            .into_iter()
            .find(|sev| sev.as_str() == s)
            .ok_or_else(|| SupportError::syntax(s))
    }
}

// =============================================================================
// EventCategory
// =============================================================================

/// Event category. A closed enumeration at the CLI level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Link Layer Discovery Protocol.
    Lldp,
    /// Link Aggregation Control Protocol.
    Lacp,
    /// OSPF routing.
    Ospf,
    /// BGP routing.
    Bgp,
    /// VLAN management.
    Vlan,
    /// Physical and logical interfaces.
    Interface,
    /// Management plane.
    Management,
    /// System-wide events.
    System,
    /// Supportability subsystem (crashes, core dumps).
    Supportability,
}

impl EventCategory {
    /// All categories in CLI order.
    pub const ALL: [Self; 9] = [
        Self::Lldp,
        Self::Lacp,
        Self::Ospf,
        Self::Bgp,
        Self::Vlan,
        Self::Interface,
        Self::Management,
        Self::System,
        Self::Supportability,
    ];

    /// Returns the CLI token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lldp => "lldp",
            Self::Lacp => "lacp",
            Self::Ospf => "ospf",
            Self::Bgp => "bgp",
            Self::Vlan => "vlan",
            Self::Interface => "interface",
            Self::Management => "management",
            Self::System => "system",
            Self::Supportability => "supportability",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = SupportError;

    fn from_str(s: &str) -> Result<Self, SupportError> {
        Self::ALL
            .into_iter()
            .find(|cat| cat.as_str() == s)
            .ok_or_else(|| SupportError::syntax(s))
    }
}

// =============================================================================
// Vlog
// =============================================================================

/// Verbose log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VlogLevel {
    /// Logging disabled.
    Off,
    /// Emergencies only.
    Emer,
    /// Errors and above.
    Err,
    /// Warnings and above.
    Warn,
    /// Informational and above.
    #[default]
    Info,
    /// Everything.
    Dbg,
}

impl VlogLevel {
    /// All levels in CLI order.
    pub const ALL: [Self; 6] = [
        Self::Off,
        Self::Emer,
        Self::Err,
        Self::Warn,
        Self::Info,
        Self::Dbg,
    ];

    /// Returns the lowercase CLI token.
    #[must_use]
    pub const fn token(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Emer => "emer",
            Self::Err => "err",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Dbg => "dbg",
        }
    }

    /// Returns the uppercase display label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Emer => "EMER",
            Self::Err => "ERR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Dbg => "DBG",
        }
    }
}

impl fmt::Display for VlogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for VlogLevel {
    type Err = SupportError;

    fn from_str(s: &str) -> Result<Self, SupportError> {
        Self::ALL
            .into_iter()
            .find(|level| level.token().eq_ignore_ascii_case(s))
            .ok_or_else(|| SupportError::syntax(s))
    }
}

/// Vlog destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VlogDestination {
    /// The system syslog.
    Syslog,
    /// The daemon's own log file.
    File,
}

impl VlogDestination {
    /// Both destinations in display order.
    pub const ALL: [Self; 2] = [Self::Syslog, Self::File];

    /// Returns the CLI token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Syslog => "syslog",
            Self::File => "file",
        }
    }
}

impl fmt::Display for VlogDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VlogDestination {
    type Err = SupportError;

    fn from_str(s: &str) -> Result<Self, SupportError> {
        match s {
            "syslog" => Ok(Self::Syslog),
            "file" => Ok(Self::File),
            other => Err(SupportError::syntax(other)),
        }
    }
}

/// Scope of a vlog setting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VlogScope {
    /// Every daemon owning the feature.
    Feature(String),
    /// A single daemon.
    Daemon(String),
}

impl VlogScope {
    /// Returns the feature or daemon name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Feature(name) | Self::Daemon(name) => name,
        }
    }
}

impl fmt::Display for VlogScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feature(name) => write!(f, "feature {name}"),
            Self::Daemon(name) => write!(f, "daemon {name}"),
        }
    }
}

// =============================================================================
// Signal names
// =============================================================================

/// POSIX signal descriptions indexed by signal number. Index 0 is the fallback.
pub static SIGNAL_NAMES: [&str; 32] = [
    "Unknown signal",
    "Hangup",
    "Interrupt",
    "Quit",
    "Illegal instruction",
    "Trace/breakpoint trap",
    "Aborted",
    "Bus error",
    "Floating point exception",
    "Killed",
    "User defined signal 1",
    "Segmentation fault",
    "User defined signal 2",
    "Broken pipe",
    "Alarm clock",
    "Terminated",
    "Stack fault",
    "Child exited",
    "Continued",
    "Stopped (signal)",
    "Stopped",
    "Stopped (tty input)",
    "Stopped (tty output)",
    "Urgent I/O condition",
    "CPU time limit exceeded",
    "File size limit exceeded",
    "Virtual timer expired",
    "Profiling timer expired",
    "Window changed",
    "I/O possible",
    "Power failure",
    "Bad system call",
];

/// Resolves a signal number to its description.
#[must_use]
pub fn signal_name(signo: i32) -> &'static str {
    usize::try_from(signo)
        .ok()
        .and_then(|idx| SIGNAL_NAMES.get(idx))
        .copied()
        .unwrap_or(SIGNAL_NAMES[0])
}

/// Longest accepted daemon name.
pub const DAEMON_NAME_MAX: usize = 255;

/// Returns true if `name` can be a daemon name and a file name component:
/// ASCII letters, digits, `.`, `_` and `-`, and not `.` or `..`.
#[must_use]
pub fn is_valid_daemon_name(name: &str) -> bool {
    (1..=DAEMON_NAME_MAX).contains(&name.len())
        && name != "."
        && name != ".."
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

/// Truncates `s` to at most `max` characters.
#[must_use]
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
