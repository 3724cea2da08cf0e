//! Supportability subsystem test harness.
//!
//! # Toyota Way: Built-in Quality (品質の作り込み)
//! Every scenario runs the assembled subsystem against real sockets in a
//! private root; nothing is mocked below the control protocol.

use std::path::Path;
use std::time::Duration;

use opsdiag::{Shell, Supportd};
use opsdiag_core::SupportConfig;

use crate::daemon::{FakeDaemon, FakeDaemonBuilder};
use crate::error::{Result, TestError};
use crate::fixtures::{FEATURE_MAPPING, SHOWTECH_MAPPING, write_mapping};

type Configure = Box<dyn FnOnce(&mut SupportConfig) + Send>;

/// A running subsystem rooted in a temporary directory.
#[derive(Debug)]
pub struct SupportHarness {
    root: tempfile::TempDir,
    config: SupportConfig,
    daemons: Vec<FakeDaemon>,
    support: Supportd,
}

impl SupportHarness {
    /// Creates a new harness builder.
    #[must_use]
    pub fn builder() -> SupportHarnessBuilder {
        SupportHarnessBuilder::default()
    }

    /// Root of every configured path.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &SupportConfig {
        &self.config
    }

    /// The running subsystem.
    #[must_use]
    pub const fn support(&self) -> &Supportd {
        &self.support
    }

    /// The operator shell.
    #[must_use]
    pub fn shell(&self) -> &Shell {
        self.support.shell()
    }

    /// Executes one operator command.
    pub async fn exec(&self, line: &str) -> String {
        self.support.shell().execute(line).await
    }

    /// Looks up a fake daemon by name.
    #[must_use]
    pub fn daemon(&self, name: &str) -> Option<&FakeDaemon> {
        self.daemons.iter().find(|d| d.name() == name)
    }

    /// Stops a fake daemon so it becomes unreachable.
    ///
    /// # Errors
    /// Returns an error if no daemon has that name.
    pub fn stop_daemon(&mut self, name: &str) -> Result<()> {
        let daemon = self
            .daemons
            .iter_mut()
            .find(|d| d.name() == name)
            .ok_or_else(|| TestError::harness(format!("no fake daemon {name}")))?;
        daemon.stop();
        Ok(())
    }

    /// Polls `check` until it returns true or `wait` runs out.
    ///
    /// # Errors
    /// [`TestError::Timeout`] if the condition never holds.
    pub async fn eventually<F>(&self, wait: Duration, mut check: F) -> Result<()>
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = tokio::time::Instant::now() + wait;
        while !check(self) {
            if tokio::time::Instant::now() >= deadline {
                return Err(TestError::Timeout(wait));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(())
    }
}

impl Drop for SupportHarness {
    fn drop(&mut self) {
        self.support.shutdown();
    }
}

/// Builder for [`SupportHarness`].
pub struct SupportHarnessBuilder {
    feature_mapping: Option<String>,
    showtech_mapping: Option<String>,
    daemons: Vec<FakeDaemonBuilder>,
    configure: Vec<Configure>,
}

impl std::fmt::Debug for SupportHarnessBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupportHarnessBuilder")
            .field("daemons", &self.daemons)
            .field("overrides", &self.configure.len())
            .finish_non_exhaustive()
    }
}

impl Default for SupportHarnessBuilder {
    fn default() -> Self {
        Self {
            feature_mapping: Some(FEATURE_MAPPING.to_string()),
            showtech_mapping: Some(SHOWTECH_MAPPING.to_string()),
            daemons: Vec::new(),
            configure: Vec::new(),
        }
    }
}

impl SupportHarnessBuilder {
    /// Replaces the diag-dump feature mapping; `None` leaves it absent.
    #[must_use]
    pub fn with_feature_mapping(mut self, text: Option<&str>) -> Self {
        self.feature_mapping = text.map(str::to_string);
        self
    }

    /// Replaces the show tech mapping; `None` leaves it absent.
    #[must_use]
    pub fn with_showtech_mapping(mut self, text: Option<&str>) -> Self {
        self.showtech_mapping = text.map(str::to_string);
        self
    }

    /// Adds a fake daemon, bound before the subsystem starts.
    #[must_use]
    pub fn with_daemon(mut self, daemon: FakeDaemonBuilder) -> Self {
        self.daemons.push(daemon);
        self
    }

    /// Adjusts the configuration after paths are rooted.
    #[must_use]
    pub fn configure(mut self, f: impl FnOnce(&mut SupportConfig) + Send + 'static) -> Self {
        self.configure.push(Box::new(f));
        self
    }

    /// Writes the mappings, binds the daemons and starts the subsystem.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    /// Returns an error if any file, socket or component fails.
    pub fn build(self) -> Result<SupportHarness> {
        let root = tempfile::tempdir()?;
        let mut config = SupportConfig::rooted_at(root.path());
        config.timeouts.diag_dump = Duration::from_secs(2);
        config.timeouts.control = Duration::from_secs(2);
        config.core_dump.capture_window = Duration::from_millis(500);
        config.core_dump.poll_interval = Duration::from_millis(20);
        config.core_dump.tftp_timeout = Duration::from_millis(500);
        config.forwarder.hostname = Some("switch1".to_string());
        for f in self.configure {
            f(&mut config);
        }

        if let Some(text) = &self.feature_mapping {
            write_mapping(&config.paths.feature_mapping, text)?;
        }
        if let Some(text) = &self.showtech_mapping {
            write_mapping(&config.paths.showtech_mapping, text)?;
        }

        let daemons = self
            .daemons
            .into_iter()
            .map(|d| d.bind(&config.paths.run_dir))
            .collect::<Result<Vec<_>>>()?;

        let support = Supportd::start(config.clone())?;
        Ok(SupportHarness {
            root,
            config,
            daemons,
            support,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_harness_starts_with_fixtures() {
        let harness = SupportHarness::builder().build().unwrap();
        assert!(harness.support().control_socket().is_some());
        assert!(harness.exec("diag-dump list").await.contains("lldp"));
    }

    #[tokio::test]
    async fn test_stop_unknown_daemon() {
        let mut harness = SupportHarness::builder().build().unwrap();
        assert!(harness.stop_daemon("ops-nothing").is_err());
    }

    #[tokio::test]
    async fn test_eventually_times_out() {
        let harness = SupportHarness::builder().build().unwrap();
        let result = harness
            .eventually(Duration::from_millis(50), |_| false)
            .await;
        assert!(matches!(result, Err(TestError::Timeout(_))));
    }
}
