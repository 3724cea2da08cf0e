//! Operator command dispatcher.
//!
//! One line in, one block of text out. Parsing is strict: a missing or
//! extra token answers `% Unknown command.` and never reaches an engine.

use std::sync::Arc;

use opsdiag_capture::{ShowTechEngine, ShowTechScope, Sink};
use opsdiag_core::{SupportError, VlogDestination, VlogLevel, VlogScope};
use opsdiag_crash::{CopyTransport, CrashMonitor, TftpClient, copy_core_dump};
use opsdiag_forward::RemoteLogTarget;

use crate::services::{Services, error_text, unknown};

/// Dispatches operator commands to the engines.
#[derive(Debug)]
pub struct Shell {
    services: Arc<Services>,
    showtech: ShowTechEngine,
    monitor: Arc<CrashMonitor>,
}

impl Shell {
    /// Creates a shell over assembled components.
    #[must_use]
    pub const fn new(
        services: Arc<Services>,
        showtech: ShowTechEngine,
        monitor: Arc<CrashMonitor>,
    ) -> Self {
        Self {
            services,
            showtech,
            monitor,
        }
    }

    /// Shared components.
    #[must_use]
    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Crash monitor.
    #[must_use]
    pub fn monitor(&self) -> &Arc<CrashMonitor> {
        &self.monitor
    }

    /// Executes one command line and returns its output.
    ///
    /// Successful configuration commands print nothing.
    pub async fn execute(&self, line: &str) -> String {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        tracing::debug!(command = %line.trim(), "shell command");

        match tokens.as_slice() {
            [] => String::new(),
            ["diag-dump", rest @ ..] => self.diag_dump(rest).await,
            ["show", "tech", rest @ ..] => self.show_tech(rest).await,
            ["vlog", rest @ ..] => self.vlog(rest).await,
            ["logging", rest @ ..] => self.logging(rest, true),
            ["no", "logging", rest @ ..] => self.logging(rest, false),
            ["debug", feature, args @ ..] if !args.is_empty() => {
                self.services.passthrough(feature, "debug", owned(args)).await
            }
            ["no", "debug", feature, args @ ..] if !args.is_empty() => {
                self.services.passthrough(feature, "no-debug", owned(args)).await
            }
            ["copy", "core-dump", rest @ ..] => self.copy_core(rest).await,
            ["clear", "core-dump", daemon, "instance-id", id] => self.clear_core(daemon, id),
            _ => match self.services.query(&tokens).await {
                Some(out) => out,
                None => unknown(),
            },
        }
    }

    async fn diag_dump(&self, args: &[&str]) -> String {
        let (feature, sink) = match args {
            ["list"] => {
                return match self.services.diag.list() {
                    Ok(list) => list,
                    Err(e) => error_text(&e),
                };
            }
            [feature, "basic"] => (*feature, Sink::Console),
            [feature, "basic", file] => (*feature, Sink::File((*file).to_string())),
            _ => return unknown(),
        };

        match self.services.diag.dump(feature, sink).await {
            Ok(report) => report.render(),
            Err(SupportError::UnknownFeature(_)) => unknown(),
            Err(e) => error_text(&e),
        }
    }

    async fn show_tech(&self, args: &[&str]) -> String {
        if args == ["list"] {
            return match self.showtech.list() {
                Ok(list) => list,
                Err(e) => error_text(&e),
            };
        }

        let args = match args {
            ["basic", rest @ ..] => rest,
            rest => rest,
        };
        let (args, sink) = match args.iter().position(|a| *a == "localfile") {
            Some(at) if at + 2 == args.len() => (&args[..at], Sink::File(args[at + 1].to_string())),
            Some(_) => return unknown(),
            None => (args, Sink::Console),
        };
        let scope = match args {
            [] => ShowTechScope::All,
            [feature] => ShowTechScope::Feature((*feature).to_string()),
            [feature, sub] => ShowTechScope::SubFeature((*feature).to_string(), (*sub).to_string()),
            _ => return unknown(),
        };

        match self.showtech.run(scope, sink).await {
            Ok(report) => report.render(),
            Err(SupportError::UnknownFeature(_)) => unknown(),
            Err(e) => error_text(&e),
        }
    }

    async fn vlog(&self, args: &[&str]) -> String {
        let [kind, name, destination, level] = args else {
            return unknown();
        };
        let scope = match *kind {
            "feature" => VlogScope::Feature((*name).to_string()),
            "daemon" => VlogScope::Daemon((*name).to_string()),
            _ => return unknown(),
        };
        let (Ok(destination), Ok(level)) = (
            destination.parse::<VlogDestination>(),
            level.parse::<VlogLevel>(),
        ) else {
            return unknown();
        };

        match self.services.vlog.set(scope, destination, level).await {
            Ok(()) => String::new(),
            Err(e) => error_text(&e),
        }
    }

    fn logging(&self, args: &[&str], add: bool) -> String {
        let target = match RemoteLogTarget::parse_args(args) {
            Ok(target) => target,
            Err(e) => return error_text(&e),
        };
        if add {
            match self.services.forwarder.add_target(target) {
                Ok(()) => String::new(),
                Err(e) => format!("{e}\n"),
            }
        } else {
            self.services.forwarder.remove_target(&target);
            String::new()
        }
    }

    async fn copy_core(&self, args: &[&str]) -> String {
        let (daemon, id, transport, server, filename) = match args {
            [daemon, "instance-id", id, transport, server] => (daemon, id, transport, server, None),
            [daemon, "instance-id", id, transport, server, file] => {
                (daemon, id, transport, server, Some(*file))
            }
            _ => return unknown(),
        };
        let Ok(instance_id) = id.parse::<u64>() else {
            return unknown();
        };
        let transport = match transport.parse::<CopyTransport>() {
            Ok(t) => t,
            Err(e) => return error_text(&e),
        };

        let settings = &self.services.config.core_dump;
        let client = TftpClient::new(settings.tftp_timeout, settings.tftp_retries);
        let outcome = copy_core_dump(
            &self.services.cores,
            client,
            daemon,
            instance_id,
            transport,
            server,
            filename,
        )
        .await;
        format!("{outcome}\n")
    }

    fn clear_core(&self, daemon: &str, id: &str) -> String {
        let Ok(instance_id) = id.parse::<u64>() else {
            return unknown();
        };
        match self.services.cores.remove(daemon, instance_id) {
            Ok(_) => String::new(),
            Err(e) => format!("{e}\n"),
        }
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| (*a).to_string()).collect()
}
