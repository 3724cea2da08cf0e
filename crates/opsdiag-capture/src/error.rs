//! Command execution errors.

use std::time::Duration;

use opsdiag_core::error::UNKNOWN_COMMAND_MESSAGE;

/// Failure running one show tech command.
///
/// These never abort a run: each is recorded inline next to the command
/// that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// No runner recognizes the command.
    #[error("% Unknown command.")]
    Unknown,

    /// The command ran and failed.
    #[error("{0}")]
    Failed(String),

    /// The command did not finish before its deadline.
    #[error("Command timed out after {}", humanize(*.0))]
    Timeout(Duration),
}

impl CommandError {
    /// Creates a failed error.
    #[must_use]
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Returns true if the command was rejected without running.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Returns true if `output` is a CLI's unknown-command rejection.
    #[must_use]
    pub fn looks_unknown(output: &str) -> bool {
        output
            .lines()
            .any(|line| line.trim_start().starts_with(UNKNOWN_COMMAND_MESSAGE.trim_end_matches('.')))
    }
}

fn humanize(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_display() {
        assert_eq!(CommandError::Unknown.to_string(), "% Unknown command.");
        assert!(CommandError::Unknown.is_unknown());
    }

    #[test]
    fn test_timeout_display() {
        let err = CommandError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Command timed out after 30s");
        let err = CommandError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "Command timed out after 250ms");
    }

    #[test]
    fn test_looks_unknown() {
        assert!(CommandError::looks_unknown("% Unknown command.\n"));
        assert!(CommandError::looks_unknown("  % Unknown command"));
        assert!(!CommandError::looks_unknown("LLDP global configuration"));
    }
}
