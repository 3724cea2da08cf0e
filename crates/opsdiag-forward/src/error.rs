//! Forwarder error types.

/// Result type alias for forwarding.
pub type Result<T> = std::result::Result<T, ForwardError>;

/// Remote log forwarding errors.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// Target address or port rejected.
    #[error("invalid remote log target: {0}")]
    InvalidTarget(String),

    /// Called outside a tokio runtime.
    #[error("no async runtime available to start target {0}")]
    NoRuntime(String),

    /// Local ingress socket could not be opened.
    #[error("syslog ingress error: {0}")]
    Ingress(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForwardError {
    /// Creates an invalid target error.
    #[must_use]
    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget(msg.into())
    }

    /// Creates an ingress error.
    #[must_use]
    pub fn ingress(msg: impl Into<String>) -> Self {
        Self::Ingress(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ForwardError::invalid_target("port 0");
        assert_eq!(err.to_string(), "invalid remote log target: port 0");

        let err = ForwardError::NoRuntime("10.0.0.1 udp 514".into());
        assert!(err.to_string().contains("10.0.0.1 udp 514"));
    }

    #[test]
    fn test_io_conversion() {
        let err: ForwardError = std::io::Error::other("boom").into();
        assert!(matches!(err, ForwardError::Io(_)));
    }
}
