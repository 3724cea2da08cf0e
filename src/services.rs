//! Shared subsystem state and the read-only query commands.
//!
//! The query commands are served both to the operator shell and, through
//! [`LocalRunner`], to show tech runs that list them in their mapping.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use opsdiag_capture::{CommandError, CommandRunner, DiagDumpEngine};
use opsdiag_core::error::UNKNOWN_COMMAND_MESSAGE;
use opsdiag_core::{
    CollectorError, ControlClient, EventCategory, EventFilter, EventLog, FeatureRegistry,
    Severity, SupportConfig, SupportError, VlogScope, VlogStore,
};
use opsdiag_crash::{CoreDumpRegistry, render_table};
use opsdiag_forward::{Forwarder, render_targets};

use crate::render;

/// Every long-lived component a command can reach.
#[derive(Debug)]
pub struct Services {
    /// Effective configuration.
    pub config: SupportConfig,
    /// Feature mappings.
    pub registry: Arc<FeatureRegistry>,
    /// Daemon control channel client.
    pub client: Arc<ControlClient>,
    /// Event log.
    pub events: Arc<EventLog>,
    /// Vlog configuration.
    pub vlog: Arc<VlogStore>,
    /// Core dump registry.
    pub cores: Arc<CoreDumpRegistry>,
    /// Remote log forwarder.
    pub forwarder: Arc<Forwarder>,
    /// Diag-dump engine.
    pub diag: DiagDumpEngine,
}

pub(crate) fn unknown() -> String {
    format!("{UNKNOWN_COMMAND_MESSAGE}\n")
}

pub(crate) fn error_text(err: &SupportError) -> String {
    format!("{err}\n")
}

impl Services {
    /// Deadline for vlog and debug requests.
    #[must_use]
    pub fn control_timeout(&self) -> Duration {
        self.config.timeouts.control
    }

    /// Answers a read-only command, or `None` if `tokens` is not one.
    pub async fn query(&self, tokens: &[&str]) -> Option<String> {
        let out = match tokens {
            ["show", "events", rest @ ..] => self.show_events(rest),
            ["show", "vlog", "config", rest @ ..] => self.show_vlog(rest).await,
            ["show", "core-dump"] => render_table(&self.cores.list()),
            ["show", "core-dump", daemon] => render_table(&self.cores.list_for(daemon)),
            ["show", "logging"] => render_targets(&self.forwarder.targets()),
            ["show", "debugging", feature] => {
                self.passthrough(feature, "show-debug", Vec::new()).await
            }
            ["show", "version"] => format!("opsdiag {}\n", env!("CARGO_PKG_VERSION")),
            ["diag-dump", "list"] => match self.diag.list() {
                Ok(list) => list,
                Err(e) => error_text(&e),
            },
            _ => return None,
        };
        Some(out)
    }

    fn show_events(&self, args: &[&str]) -> String {
        let filter = match args {
            [] => Ok(EventFilter::All),
            ["event-id", id] => id
                .parse::<u64>()
                .map(EventFilter::ById)
                .map_err(|_| SupportError::syntax(*id)),
            ["category", category] => category
                .parse::<EventCategory>()
                .map(EventFilter::ByCategory),
            ["severity", severity] => severity.parse::<Severity>().map(EventFilter::BySeverity),
            _ => Err(SupportError::syntax(args.join(" "))),
        };
        match filter {
            Ok(filter) => render::events(filter, &self.events.query(filter)),
            Err(e) => error_text(&e),
        }
    }

    async fn show_vlog(&self, args: &[&str]) -> String {
        match args {
            [] => render::vlog_all(&self.registry.list(), |scope| self.vlog.snapshot(scope)),
            ["list"] => render::vlog_features(&self.registry.list()),
            ["feature", name] => {
                let scope = VlogScope::Feature((*name).to_string());
                match self.vlog.get(&scope).await {
                    Ok(levels) => render::vlog_scope("Feature", name, &levels),
                    Err(e) => error_text(&e),
                }
            }
            ["daemon", name] => {
                let scope = VlogScope::Daemon((*name).to_string());
                match self.vlog.get(&scope).await {
                    Ok(levels) => render::vlog_scope("Daemon", name, &levels),
                    Err(e) => error_text(&e),
                }
            }
            _ => unknown(),
        }
    }

    /// Sends `<feature>/<verb>` with `args` to every daemon of `feature`.
    ///
    /// Each daemon's reply is printed in mapping order; an unreachable
    /// daemon is reported and the loop continues.
    pub async fn passthrough(&self, feature: &str, verb: &str, args: Vec<String>) -> String {
        let entry = match self.registry.lookup(feature) {
            Ok(entry) => entry,
            Err(e) => return error_text(&e),
        };
        let method = format!("{feature}/{verb}");
        let mut out = String::new();
        for daemon in &entry.daemons {
            let reply = self
                .client
                .call_ok(&daemon.identifier, &method, args.clone(), self.control_timeout())
                .await;
            match reply {
                Ok(text) => {
                    out.push_str(&text);
                    if !text.is_empty() && !text.ends_with('\n') {
                        out.push('\n');
                    }
                }
                Err(e @ (CollectorError::Unreachable { .. } | CollectorError::Timeout { .. })) => {
                    out.push_str(&format!("{e}\n"));
                }
                Err(CollectorError::DaemonError { message, .. }) => {
                    out.push_str(&message);
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// Serves the query commands to show tech; everything else is unknown.
#[derive(Debug)]
pub struct LocalRunner {
    services: Arc<Services>,
}

impl LocalRunner {
    /// Creates a runner over `services`.
    #[must_use]
    pub const fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, command: &str) -> Result<String, CommandError> {
        let tokens: Vec<&str> = command.split_whitespace().collect();
        match self.services.query(&tokens).await {
            Some(out) if CommandError::looks_unknown(&out) => Err(CommandError::Unknown),
            Some(out) => Ok(out),
            None => Err(CommandError::Unknown),
        }
    }
}
