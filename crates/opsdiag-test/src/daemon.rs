//! Fake feature daemons serving the control protocol.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use opsdiag_core::{ControlServer, DaemonVlog, RunningServer, VlogDestination, VlogLevel};

use crate::error::Result;

type DiagProvider = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Debug flags a fake daemon has been asked to enable, per feature.
pub type DebugFlags = Arc<Mutex<BTreeMap<String, Vec<String>>>>;

/// Builder for a [`FakeDaemon`].
pub struct FakeDaemonBuilder {
    name: String,
    diag: Option<DiagProvider>,
    debug_features: Vec<String>,
}

impl std::fmt::Debug for FakeDaemonBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeDaemonBuilder")
            .field("name", &self.name)
            .field("diag", &self.diag.is_some())
            .field("debug_features", &self.debug_features)
            .finish()
    }
}

impl FakeDaemonBuilder {
    /// Answers diag-dump with `text` for every feature.
    #[must_use]
    pub fn with_diag_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.diag = Some(Arc::new(move |_| Some(text.clone())));
        self
    }

    /// Answers diag-dump with an error reply.
    #[must_use]
    pub fn with_failing_diag(mut self) -> Self {
        self.diag = Some(Arc::new(|_| None));
        self
    }

    /// Serves `<feature>/debug`, `<feature>/no-debug` and
    /// `<feature>/show-debug`.
    #[must_use]
    pub fn with_debug(mut self, feature: impl Into<String>) -> Self {
        self.debug_features.push(feature.into());
        self
    }

    /// Binds `<run_dir>/<name>.ctl` and starts serving.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be bound.
    pub fn bind(self, run_dir: &Path) -> Result<FakeDaemon> {
        std::fs::create_dir_all(run_dir)?;
        let vlog = DaemonVlog::default();
        let debug: DebugFlags = Arc::default();

        let mut server = ControlServer::new().with_vlog(vlog.clone());
        if let Some(diag) = self.diag {
            server = server.with_diag_dump(move |feature| diag(feature));
        }
        for feature in &self.debug_features {
            let on = Arc::clone(&debug);
            let key = feature.clone();
            server.register_fn(format!("{feature}/debug"), 1, usize::MAX, move |params| {
                let mut flags = on.lock();
                let entry = flags.entry(key.clone()).or_default();
                for flag in params {
                    if !entry.contains(flag) {
                        entry.push(flag.clone());
                    }
                }
                Ok(String::new())
            });

            let off = Arc::clone(&debug);
            let key = feature.clone();
            server.register_fn(format!("{feature}/no-debug"), 1, usize::MAX, move |params| {
                if let Some(entry) = off.lock().get_mut(&key) {
                    entry.retain(|flag| !params.contains(flag));
                }
                Ok(String::new())
            });

            let show = Arc::clone(&debug);
            let key = feature.clone();
            server.register_fn(format!("{feature}/show-debug"), 0, 0, move |_| {
                let flags = show.lock();
                Ok(match flags.get(&key) {
                    Some(entry) if !entry.is_empty() => format!("{key} debugging: {}", entry.join(" ")),
                    _ => format!("{key} debugging is off"),
                })
            });
        }

        let server = server.bind(run_dir.join(format!("{}.ctl", self.name)))?;
        tracing::debug!(daemon = %self.name, "fake daemon listening");
        Ok(FakeDaemon {
            name: self.name,
            vlog,
            debug,
            server: Some(server),
        })
    }
}

/// A fake daemon bound in a run directory.
#[derive(Debug)]
pub struct FakeDaemon {
    name: String,
    vlog: DaemonVlog,
    debug: DebugFlags,
    server: Option<RunningServer>,
}

impl FakeDaemon {
    /// Starts building a daemon called `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> FakeDaemonBuilder {
        FakeDaemonBuilder {
            name: name.into(),
            diag: None,
            debug_features: Vec::new(),
        }
    }

    /// Daemon name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live level the daemon applies for `destination`.
    #[must_use]
    pub fn vlog_level(&self, destination: VlogDestination) -> VlogLevel {
        self.vlog.get(destination)
    }

    /// Debug flags currently enabled for `feature`.
    #[must_use]
    pub fn debug_flags(&self, feature: &str) -> Vec<String> {
        self.debug.lock().get(feature).cloned().unwrap_or_default()
    }

    /// Returns true while the control socket is served.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.server.is_some()
    }

    /// Stops serving; later requests see the daemon as unreachable.
    pub fn stop(&mut self) {
        self.server = None;
    }
}
