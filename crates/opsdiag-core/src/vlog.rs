//! Vlog configuration store.
//!
//! Holds `(scope, destination) -> level` and pushes every change to the live
//! daemons in scope over the control channel, so a new level takes effect
//! without a restart. Absent entries read as [`VlogLevel::Info`].

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::channel::{ControlClient, parse_vlog_arg};
use crate::error::{Result, SupportError};
use crate::registry::FeatureRegistry;
use crate::types::{VlogDestination, VlogLevel, VlogScope};

/// Levels per destination for one scope.
pub type VlogLevels = BTreeMap<VlogDestination, VlogLevel>;

/// Live vlog configuration.
///
/// Writes are serialized by an async gate held across the live apply;
/// reads only take the short table lock and never wait on a daemon.
#[derive(Debug)]
pub struct VlogStore {
    registry: Arc<FeatureRegistry>,
    client: Arc<ControlClient>,
    timeout: Duration,
    table: RwLock<BTreeMap<(VlogScope, VlogDestination), VlogLevel>>,
    write_gate: tokio::sync::Mutex<()>,
}

impl VlogStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(registry: Arc<FeatureRegistry>, client: Arc<ControlClient>, timeout: Duration) -> Self {
        Self {
            registry,
            client,
            timeout,
            table: RwLock::new(BTreeMap::new()),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Sets a level and applies it to the live daemons in scope.
    ///
    /// A feature-scoped change also becomes the daemon-scoped value of
    /// every owning daemon that accepted it.
    ///
    /// # Errors
    /// [`SupportError::UnknownFeature`] or [`SupportError::UnknownDaemon`].
    pub async fn set(
        &self,
        scope: VlogScope,
        destination: VlogDestination,
        level: VlogLevel,
    ) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        let arg = format!("{}:{}", destination.as_str(), level.token());

        match &scope {
            VlogScope::Feature(name) => {
                let feature = self
                    .registry
                    .lookup(name)
                    .map_err(|_| SupportError::UnknownFeature(name.clone()))?;

                let mut applied = Vec::new();
                for daemon in &feature.daemons {
                    match self
                        .client
                        .call_ok(&daemon.identifier, "vlog/set", vec![arg.clone()], self.timeout)
                        .await
                    {
                        Ok(_) => applied.push(daemon.identifier.clone()),
                        Err(e) => {
                            tracing::warn!(feature = %name, daemon = %daemon.identifier, error = %e, "vlog change not applied");
                        }
                    }
                }

                let mut table = self.table.write();
                table.insert((scope.clone(), destination), level);
                for daemon in applied {
                    table.insert((VlogScope::Daemon(daemon), destination), level);
                }
            }
            VlogScope::Daemon(name) => {
                self.client
                    .call_ok(name, "vlog/set", vec![arg], self.timeout)
                    .await
                    .map_err(|_| SupportError::UnknownDaemon(name.clone()))?;
                self.table.write().insert((scope.clone(), destination), level);
            }
        }

        tracing::info!(scope = %scope, destination = %destination, level = %level, "vlog level set");
        Ok(())
    }

    /// Returns the levels of `scope`.
    ///
    /// A daemon scope is probed over the control channel; levels it reports
    /// fill destinations never set through this store.
    ///
    /// # Errors
    /// [`SupportError::UnknownFeature`] or [`SupportError::UnknownDaemon`].
    pub async fn get(&self, scope: &VlogScope) -> Result<VlogLevels> {
        match scope {
            VlogScope::Feature(name) => {
                self.registry
                    .lookup(name)
                    .map_err(|_| SupportError::UnknownFeature(name.clone()))?;
                Ok(self.snapshot(scope))
            }
            VlogScope::Daemon(name) => {
                let reported = self
                    .client
                    .call_ok(name, "vlog/list", Vec::new(), self.timeout)
                    .await
                    .map_err(|_| SupportError::UnknownDaemon(name.clone()))?;

                let mut levels: VlogLevels = reported
                    .split_whitespace()
                    .filter_map(|pair| parse_vlog_arg(pair).ok())
                    .collect();
                let table = self.table.read();
                for dest in VlogDestination::ALL {
                    if let Some(level) = table.get(&(scope.clone(), dest)) {
                        levels.insert(dest, *level);
                    }
                    levels.entry(dest).or_default();
                }
                Ok(levels)
            }
        }
    }

    /// Returns stored levels without validation or daemon contact.
    #[must_use]
    pub fn snapshot(&self, scope: &VlogScope) -> VlogLevels {
        let table = self.table.read();
        VlogDestination::ALL
            .into_iter()
            .map(|dest| {
                let level = table
                    .get(&(scope.clone(), dest))
                    .copied()
                    .unwrap_or_default();
                (dest, level)
            })
            .collect()
    }
}
