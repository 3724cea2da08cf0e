//! Subsystem assembly.
//!
//! # Toyota Way: Kaizen (改善)
//! One constructor wires every component from one configuration; the
//! background tasks it starts are owned here and stop with it.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use opsdiag_capture::{DiagDumpEngine, ExternalRunner, FallbackRunner, ShowTechEngine};
use opsdiag_core::channel::INVALID_PARAMS;
use opsdiag_core::{
    ControlClient, ControlServer, DaemonCollector, EventCategory, EventLog, FeatureRegistry,
    MappingSources, ReplyError, RunningServer, Severity, SupportConfig, VlogStore,
    is_valid_daemon_name,
};
use opsdiag_crash::{
    CoreDumpRegistry, CrashMonitor, CrashReport, CrashReporter, MonitorSettings, Retention,
};
use opsdiag_forward::{Forwarder, SyslogIngress, forward_events};

use crate::error::Result;
use crate::services::{LocalRunner, Services};
use crate::shell::Shell;

/// Control method through which daemons publish events.
pub const EVENT_LOG_METHOD: &str = "event/log";

/// Control method through which the core handler reports a crash.
pub const CORE_REPORT_METHOD: &str = "coredump/report";

/// The running supportability subsystem.
#[derive(Debug)]
pub struct Supportd {
    shell: Arc<Shell>,
    control: Option<RunningServer>,
    ingress: Option<SyslogIngress>,
    tasks: Vec<JoinHandle<()>>,
}

impl Supportd {
    /// Assembles and starts the subsystem with a fresh forwarder.
    ///
    /// # Errors
    /// Fails on an invalid configuration or an unusable core directory.
    pub fn start(config: SupportConfig) -> Result<Self> {
        let forwarder = Arc::new(Forwarder::new(&config.forwarder));
        Self::start_with(config, forwarder)
    }

    /// Assembles and starts the subsystem around an existing forwarder,
    /// such as the one already feeding a [`opsdiag_forward::ForwardLayer`].
    ///
    /// Must run inside a tokio runtime. The control socket and the local
    /// syslog socket are optional: failing to bind either is logged and
    /// the rest keeps running.
    ///
    /// # Errors
    /// Fails on an invalid configuration or an unusable core directory.
    pub fn start_with(config: SupportConfig, forwarder: Arc<Forwarder>) -> Result<Self> {
        config.validate()?;
        let paths = &config.paths;

        let registry = Arc::new(
            FeatureRegistry::open(MappingSources {
                feature_mapping: paths.feature_mapping.clone(),
                showtech_mapping: paths.showtech_mapping.clone(),
            })
            .with_reload_on_change(config.registry.reload_on_change),
        );
        let client = Arc::new(ControlClient::new(&paths.run_dir));

        let mut events = EventLog::new(config.event_log.capacity);
        if !paths.event_log_file.as_os_str().is_empty() {
            events = events.with_file(&paths.event_log_file);
        }
        let events = Arc::new(events);

        let vlog = Arc::new(VlogStore::new(
            Arc::clone(&registry),
            Arc::clone(&client),
            config.timeouts.control,
        ));
        let cores = Arc::new(CoreDumpRegistry::open(
            &paths.core_dir,
            Retention {
                max_count: config.core_dump.max_count,
                max_age: config.core_dump.max_age,
            },
        )?);
        let diag = DiagDumpEngine::new(
            Arc::clone(&registry),
            DaemonCollector::new(Arc::clone(&client)),
            &paths.diag_dir,
            config.timeouts.diag_dump,
        );
        let monitor = CrashMonitor::new(
            Arc::clone(&events),
            Arc::clone(&cores),
            MonitorSettings {
                spool_dir: paths.core_spool_dir.clone(),
                capture_window: config.core_dump.capture_window,
                poll_interval: config.core_dump.poll_interval,
            },
        );

        let control_socket = paths.control_socket.clone();
        let syslog_socket = paths.syslog_socket.clone();
        let showtech_dir = paths.showtech_dir.clone();
        let timeouts = config.timeouts.clone();

        let services = Arc::new(Services {
            config,
            registry: Arc::clone(&registry),
            client,
            events: Arc::clone(&events),
            vlog,
            cores,
            forwarder: Arc::clone(&forwarder),
            diag,
        });

        let runner = FallbackRunner::new(Arc::new(LocalRunner::new(Arc::clone(&services))))
            .with_fallback(Arc::new(ExternalRunner::vtysh()));
        let showtech = ShowTechEngine::new(registry, Arc::new(runner), showtech_dir)
            .with_timeouts(timeouts.show_tech_command, timeouts.show_tech_total);

        let mut tasks = Vec::new();
        if let Some(task) = monitor.start() {
            tasks.push(task);
        }
        tasks.push(forward_events(&events, Arc::clone(&forwarder)));

        let control = match control_server(Arc::clone(&events), monitor.reporter())
            .bind(&control_socket)
        {
            Ok(server) => Some(server),
            Err(e) => {
                tracing::warn!(socket = %control_socket.display(), error = %e, "control socket unavailable");
                None
            }
        };
        let ingress = match SyslogIngress::bind(&syslog_socket, forwarder) {
            Ok(ingress) => Some(ingress),
            Err(e) => {
                tracing::warn!(error = %e, "local syslog ingress unavailable");
                None
            }
        };

        tracing::info!(
            features = services.registry.list().len(),
            cores = services.cores.len(),
            "supportability subsystem started"
        );
        Ok(Self {
            shell: Arc::new(Shell::new(services, showtech, monitor)),
            control,
            ingress,
            tasks,
        })
    }

    /// The operator shell.
    #[must_use]
    pub fn shell(&self) -> &Arc<Shell> {
        &self.shell
    }

    /// Control socket path, if it was bound.
    #[must_use]
    pub fn control_socket(&self) -> Option<PathBuf> {
        self.control.as_ref().map(|s| s.path().to_path_buf())
    }

    /// Stops every background task.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.control = None;
        self.ingress = None;
        self.shell.services().forwarder.shutdown();
        tracing::info!("supportability subsystem stopped");
    }
}

impl Drop for Supportd {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

/// Builds the management process's own control server.
///
/// - `event/log <category> <severity> <code> <message..>`
/// - `coredump/report <daemon> <pid> <signal> [<raw core path>]`
#[must_use]
pub fn control_server(events: Arc<EventLog>, reporter: CrashReporter) -> ControlServer {
    let mut server = ControlServer::new();

    server.register_fn(EVENT_LOG_METHOD, 4, usize::MAX, move |params| {
        let invalid = |what: &str| ReplyError::new(INVALID_PARAMS, format!("invalid {what}"));
        let category: EventCategory = params[0].parse().map_err(|_| invalid("category"))?;
        let severity: Severity = params[1].parse().map_err(|_| invalid("severity"))?;
        let code: u32 = params[2].parse().map_err(|_| invalid("event code"))?;
        let record = events.record_coded(category, severity, code, params[3..].join(" "));
        Ok(record.id.to_string())
    });

    server.register_fn(CORE_REPORT_METHOD, 3, 4, move |params| {
        let invalid = |what: &str| ReplyError::new(INVALID_PARAMS, format!("invalid {what}"));
        if !is_valid_daemon_name(&params[0]) {
            return Err(invalid("daemon"));
        }
        let pid: u32 = params[1].parse().map_err(|_| invalid("pid"))?;
        let signal: i32 = params[2].parse().map_err(|_| invalid("signal"))?;
        let mut report = CrashReport::new(params[0].clone(), Some(pid), signal);
        if let Some(core) = params.get(3) {
            report = report.with_core(core);
        }
        reporter
            .try_report(report)
            .map_err(|e| ReplyError::new(opsdiag_core::channel::HANDLER_FAILED, e.to_string()))?;
        Ok(String::new())
    });

    server
}
