//! Assembly error types.

use opsdiag_core::SupportError;
use opsdiag_crash::CrashError;
use opsdiag_forward::ForwardError;

/// Result type alias for system assembly.
pub type Result<T> = std::result::Result<T, OpsdiagError>;

/// Errors raised while assembling or running the subsystem.
#[derive(Debug, thiserror::Error)]
pub enum OpsdiagError {
    /// Registry, capture or configuration failure.
    #[error(transparent)]
    Support(#[from] SupportError),

    /// Crash monitor or core storage failure.
    #[error(transparent)]
    Crash(#[from] CrashError),

    /// Remote log forwarding failure.
    #[error(transparent)]
    Forward(#[from] ForwardError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_display() {
        let err: OpsdiagError = SupportError::config("event_log.capacity must be > 0").into();
        assert_eq!(
            err.to_string(),
            "configuration error: event_log.capacity must be > 0"
        );

        let err: OpsdiagError = CrashError::Stopped.into();
        assert_eq!(err.to_string(), "crash monitor is not running");
    }
}
