//! Command execution seam for show tech.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use crate::error::CommandError;

/// Executes one CLI command and returns its text output.
///
/// Implementations must not block the runtime; every call is bounded by the
/// caller's deadline and may be cancelled by dropping the future.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `command`.
    ///
    /// # Errors
    /// [`CommandError::Unknown`] when the command is not recognized,
    /// [`CommandError::Failed`] when it ran and failed.
    async fn run(&self, command: &str) -> Result<String, CommandError>;
}

/// Runs commands through an external CLI binary (`vtysh -c <cmd>`).
#[derive(Debug, Clone)]
pub struct ExternalRunner {
    program: PathBuf,
    prefix: Vec<String>,
}

impl ExternalRunner {
    /// Creates a runner invoking `program <prefix..> <command>`.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, prefix: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix,
        }
    }

    /// The switch shell in single-command mode.
    #[must_use]
    pub fn vtysh() -> Self {
        Self::new("vtysh", vec!["-c".to_string()])
    }

    /// Returns the program path.
    #[must_use]
    pub fn program(&self) -> &std::path::Path {
        &self.program
    }
}

#[async_trait]
impl CommandRunner for ExternalRunner {
    async fn run(&self, command: &str) -> Result<String, CommandError> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.prefix)
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    tracing::debug!(program = %self.program.display(), "external cli not installed");
                    CommandError::Unknown
                } else {
                    CommandError::failed(format!("failed to run {}: {e}", self.program.display()))
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if CommandError::looks_unknown(&stdout) {
            return Err(CommandError::Unknown);
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.trim();
            return Err(CommandError::failed(if reason.is_empty() {
                format!("command exited with {}", output.status)
            } else {
                reason.to_string()
            }));
        }
        Ok(stdout)
    }
}

/// Tries a primary runner, then a fallback for commands the primary does
/// not know.
#[derive(Clone)]
pub struct FallbackRunner {
    primary: Arc<dyn CommandRunner>,
    fallback: Option<Arc<dyn CommandRunner>>,
}

impl std::fmt::Debug for FallbackRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRunner")
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl FallbackRunner {
    /// Creates a runner with no fallback.
    #[must_use]
    pub fn new(primary: Arc<dyn CommandRunner>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    /// Sets the fallback runner.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn CommandRunner>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[async_trait]
impl CommandRunner for FallbackRunner {
    async fn run(&self, command: &str) -> Result<String, CommandError> {
        match self.primary.run(command).await {
            Err(CommandError::Unknown) => match &self.fallback {
                Some(fallback) => fallback.run(command).await,
                None => Err(CommandError::Unknown),
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Only(&'static str, &'static str);

    #[async_trait]
    impl CommandRunner for Only {
        async fn run(&self, command: &str) -> Result<String, CommandError> {
            if command == self.0 {
                Ok(self.1.to_string())
            } else {
                Err(CommandError::Unknown)
            }
        }
    }

    #[tokio::test]
    async fn test_fallback_order() {
        let runner = FallbackRunner::new(Arc::new(Only("show events", "local")))
            .with_fallback(Arc::new(Only("show lldp neighbors", "remote")));

        assert_eq!(runner.run("show events").await.unwrap(), "local");
        assert_eq!(runner.run("show lldp neighbors").await.unwrap(), "remote");
        assert_eq!(runner.run("show testing").await.unwrap_err(), CommandError::Unknown);
    }

    #[tokio::test]
    async fn test_no_fallback() {
        let runner = FallbackRunner::new(Arc::new(Only("a", "b")));
        assert!(runner.run("c").await.unwrap_err().is_unknown());
    }

    #[tokio::test]
    async fn test_external_missing_program_is_unknown() {
        let runner = ExternalRunner::new("/nonexistent/opsdiag-cli", vec!["-c".into()]);
        assert_eq!(runner.run("show version").await.unwrap_err(), CommandError::Unknown);
    }

    #[tokio::test]
    async fn test_external_runs_shell() {
        let runner = ExternalRunner::new("/bin/sh", vec!["-c".into()]);
        assert_eq!(runner.run("echo hello").await.unwrap().trim(), "hello");

        let err = runner.run("echo '% Unknown command.'").await.unwrap_err();
        assert!(err.is_unknown());

        let err = runner.run("echo broken >&2; exit 3").await.unwrap_err();
        assert_eq!(err, CommandError::Failed("broken".into()));
    }
}
