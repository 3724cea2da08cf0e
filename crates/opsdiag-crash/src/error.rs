//! Crash monitor error types.

/// Result type alias for crash handling.
pub type Result<T> = std::result::Result<T, CrashError>;

/// Crash monitor errors.
#[derive(Debug, thiserror::Error)]
pub enum CrashError {
    /// No core dump with this daemon and instance id.
    #[error("core dump {instance_id} of daemon {daemon} not found")]
    NotFound {
        /// Daemon name.
        daemon: String,
        /// Instance id.
        instance_id: u64,
    },

    /// Daemon name unusable as a core file name component.
    #[error("invalid daemon name {0:?}")]
    InvalidDaemon(String),

    /// Core file could not be written or indexed.
    #[error("core storage error: {0}")]
    Storage(String),

    /// A supervised process could not be started.
    #[error("failed to spawn {daemon}: {reason}")]
    Spawn {
        /// Daemon name.
        daemon: String,
        /// Underlying cause.
        reason: String,
    },

    /// Copy-out transfer failed.
    #[error("{0}")]
    Transfer(String),

    /// The monitor task has stopped.
    #[error("crash monitor is not running")]
    Stopped,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrashError {
    /// Creates a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a transfer error.
    #[must_use]
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::Transfer(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = CrashError::NotFound {
            daemon: "ops-lldpd".into(),
            instance_id: 7,
        };
        assert_eq!(err.to_string(), "core dump 7 of daemon ops-lldpd not found");
    }

    #[test]
    fn test_transfer_display_is_reason() {
        let err = CrashError::transfer("TFTP server 10.0.0.1:69 did not respond");
        assert_eq!(err.to_string(), "TFTP server 10.0.0.1:69 did not respond");
    }
}
