//! Error types for opsdiag-core.
//!
//! Every failure a CLI request can hit is a value of [`SupportError`]; the
//! management process never panics on bad input, missing daemons or
//! corrupt mapping files.

use std::time::Duration;

/// Result type alias for supportability operations.
pub type Result<T> = std::result::Result<T, SupportError>;

/// Message printed when no feature mapping could be loaded.
pub const NO_MAPPING_MESSAGE: &str =
    "Feature to daemon mapping failed. Unable to retrieve the daemon name.";

/// Message printed for any parser-level rejection.
pub const UNKNOWN_COMMAND_MESSAGE: &str = "% Unknown command.";

/// Supportability error taxonomy.
///
/// # Toyota Way: Jidoka (自働化)
/// Errors are classified at the point of failure so the request layer can
/// stop the single request (syntax, resolution) or only the affected
/// daemon's contribution (communication) without further inspection.
#[derive(Debug, thiserror::Error)]
pub enum SupportError {
    /// Unknown command, argument or token. Never reaches the engines.
    #[error("% Unknown command.")]
    Syntax(String),

    /// The feature mapping is absent or empty.
    #[error("Feature to daemon mapping failed. Unable to retrieve the daemon name.")]
    NoMapping,

    /// Feature name not present in the registry.
    #[error("Feature not present")]
    UnknownFeature(String),

    /// Sub-feature not declared under the requested feature.
    #[error("Sub Feature {0} is not supported")]
    UnknownSubFeature(String),

    /// Daemon scope that cannot be reached or does not exist.
    #[error("Not able to communicate with daemon {0}")]
    UnknownDaemon(String),

    /// Feature advertised as capturable but with no daemon to capture from.
    #[error("{0} feature has no daemon to capture from")]
    UnresolvedDaemon(String),

    /// Daemon unreachable or timed out.
    #[error(transparent)]
    Communication(#[from] CollectorError),

    /// Caller-supplied sink file name rejected before any capture.
    #[error("Failed to validate destination file name:{0}")]
    InvalidFileName(String),

    /// Mapping, sink or core file storage failure. The message is shown as is.
    #[error("{0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not occur in production).
    #[error("internal error: {0}")]
    Internal(String),
}

impl SupportError {
    /// Creates a syntax error naming the offending token.
    #[must_use]
    pub fn syntax(token: impl Into<String>) -> Self {
        Self::Syntax(token.into())
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for registry-level scope failures.
    #[must_use]
    pub const fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::NoMapping
                | Self::UnknownFeature(_)
                | Self::UnknownSubFeature(_)
                | Self::UnknownDaemon(_)
                | Self::UnresolvedDaemon(_)
        )
    }

    /// Returns true if the error ends the whole request.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Syntax(_) | Self::InvalidFileName(_)) || self.is_resolution()
    }

    /// Returns true if the error only removes one daemon's contribution.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        matches!(self, Self::Communication(_))
    }
}

/// Failure contacting a daemon over its control channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectorError {
    /// Process not running, socket missing or connection refused.
    #[error("failed to connect daemon {daemon}")]
    Unreachable {
        /// Daemon identifier.
        daemon: String,
        /// Underlying cause.
        reason: String,
    },

    /// No reply before the deadline.
    #[error("Daemon {daemon} Timed Out")]
    Timeout {
        /// Daemon identifier.
        daemon: String,
        /// Deadline that expired.
        after: Duration,
    },

    /// The daemon rejected the request at the protocol level.
    #[error("daemon {daemon} returned error {code}: {message}")]
    DaemonError {
        /// Daemon identifier.
        daemon: String,
        /// Protocol error code.
        code: i64,
        /// Error text from the daemon.
        message: String,
    },
}

impl CollectorError {
    /// Creates an unreachable error.
    #[must_use]
    pub fn unreachable(daemon: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            daemon: daemon.into(),
            reason: reason.into(),
        }
    }

    /// Returns the daemon this error concerns.
    #[must_use]
    pub fn daemon(&self) -> &str {
        match self {
            Self::Unreachable { daemon, .. }
            | Self::Timeout { daemon, .. }
            | Self::DaemonError { daemon, .. } => daemon,
        }
    }

    /// Returns true if the cached channel must be re-resolved.
    #[must_use]
    pub const fn invalidates_channel(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_display_is_unknown_command() {
        let err = SupportError::syntax("extraparameter");
        assert_eq!(err.to_string(), UNKNOWN_COMMAND_MESSAGE);
    }

    #[test]
    fn test_no_mapping_display() {
        assert_eq!(SupportError::NoMapping.to_string(), NO_MAPPING_MESSAGE);
    }

    #[test]
    fn test_resolution_messages() {
        assert_eq!(
            SupportError::UnknownFeature("abc".into()).to_string(),
            "Feature not present"
        );
        assert_eq!(
            SupportError::UnknownSubFeature("xyz".into()).to_string(),
            "Sub Feature xyz is not supported"
        );
        assert_eq!(
            SupportError::UnknownDaemon("ops-xyz".into()).to_string(),
            "Not able to communicate with daemon ops-xyz"
        );
    }

    #[test]
    fn test_error_classes() {
        assert!(SupportError::syntax("x").is_terminal());
        assert!(SupportError::NoMapping.is_terminal());
        assert!(SupportError::UnknownDaemon("d".into()).is_resolution());

        let comm = SupportError::from(CollectorError::unreachable("ops-lldpd", "refused"));
        assert!(comm.is_partial());
        assert!(!comm.is_terminal());
        assert!(!SupportError::storage("corrupt").is_terminal());
        assert!(SupportError::InvalidFileName("../x".into()).is_terminal());
    }

    #[test]
    fn test_collector_error_display() {
        let err = CollectorError::unreachable("ops-lldpd", "connection refused");
        assert_eq!(err.to_string(), "failed to connect daemon ops-lldpd");
        assert_eq!(err.daemon(), "ops-lldpd");

        let err = CollectorError::Timeout {
            daemon: "ops-lacpd".into(),
            after: Duration::from_secs(10),
        };
        assert_eq!(err.to_string(), "Daemon ops-lacpd Timed Out");
        assert!(err.invalidates_channel());
    }

    #[test]
    fn test_daemon_error_keeps_channel() {
        let err = CollectorError::DaemonError {
            daemon: "ops-lldpd".into(),
            code: -32601,
            message: "unknown command".into(),
        };
        assert!(!err.invalidates_channel());
        assert!(err.to_string().contains("-32601"));
    }
}
