//! Test error types.

use opsdiag::OpsdiagError;
use opsdiag_core::SupportError;

/// Result type alias for test operations.
pub type Result<T> = std::result::Result<T, TestError>;

/// Testing errors.
#[derive(Debug, thiserror::Error)]
pub enum TestError {
    /// Harness error.
    #[error("harness error: {0}")]
    Harness(String),

    /// Assertion failed.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// Timeout.
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    /// Subsystem could not be assembled.
    #[error("subsystem error: {0}")]
    Subsystem(#[from] OpsdiagError),

    /// Registry or configuration error.
    #[error("support error: {0}")]
    Support(#[from] SupportError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TestError {
    /// Creates a harness error.
    #[must_use]
    pub fn harness(msg: impl Into<String>) -> Self {
        Self::Harness(msg.into())
    }

    /// Creates an assertion error.
    #[must_use]
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_harness_error() {
        let err = TestError::harness("mapping write failed");
        assert!(err.to_string().contains("harness error"));
        assert!(err.to_string().contains("mapping write failed"));
    }

    #[test]
    fn test_assertion_error() {
        let err = TestError::assertion("expected 2 lines, got 0");
        assert!(err.to_string().contains("assertion failed"));
    }

    #[test]
    fn test_timeout_error() {
        let err = TestError::Timeout(Duration::from_secs(3));
        assert!(err.to_string().contains("timeout"));
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn test_support_error_conversion() {
        let err: TestError = SupportError::NoMapping.into();
        assert!(err.to_string().contains("support error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: TestError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }
}
