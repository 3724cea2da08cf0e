//! Diagnostic dump engine.
//!
//! One request walks `Idle -> ResolvingFeature -> CollectingFromDaemon ->
//! Formatting -> Writing -> Idle`. Resolution failures end the request
//! before any daemon is contacted; collection failures of individual
//! daemons are reported inline unless no daemon answered at all.

use chrono::{DateTime, Local, Utc};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use opsdiag_core::{
    CaptureKind, CollectorError, DaemonCollector, DiagnosticPayload, FeatureRegistry, Result,
    SupportError,
};

use crate::sink::{self, Sink};

/// Header of `diag-dump list`.
pub const LIST_HEADER: &str = "Diagnostic Dump Supported Features List";

const FEATURE_RULE: &str =
    "================================================================================";
const DAEMON_RULE: &str =
    "--------------------------------------------------------------------------------";

/// Stage of one diag-dump request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpState {
    /// Not running.
    Idle,
    /// Looking the feature up in the registry.
    ResolvingFeature,
    /// Contacting the owning daemons.
    CollectingFromDaemon,
    /// Building the document.
    Formatting,
    /// Persisting a file sink.
    Writing,
}

/// Result of a completed diag-dump request.
#[derive(Debug, Clone)]
pub struct DumpReport {
    /// Unique id of this capture.
    pub capture_id: Uuid,
    /// Feature captured.
    pub feature: String,
    /// Capture kind requested.
    pub kind: CaptureKind,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Payloads in daemon order, PASS and FAIL alike.
    pub payloads: Vec<DiagnosticPayload>,
    /// Daemons that could not be reached in time.
    pub failures: Vec<CollectorError>,
    /// The rendered document.
    pub document: String,
    /// Where a file sink was written.
    pub file: Option<PathBuf>,
    /// Stages visited, ending in [`DumpState::Idle`].
    pub states: Vec<DumpState>,
}

impl DumpReport {
    /// Number of daemons contacted.
    #[must_use]
    pub fn daemon_count(&self) -> usize {
        self.payloads.len() + self.failures.len()
    }

    /// Number of daemons that did not produce PASS data.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failures.len() + self.payloads.iter().filter(|p| !p.passed()).count()
    }

    /// Returns true if every contacted daemon produced PASS data.
    #[must_use]
    pub fn complete(&self) -> bool {
        self.failed_count() == 0
    }

    /// One-line outcome.
    #[must_use]
    pub fn summary(&self) -> String {
        match self.failed_count() {
            0 => format!("Diagnostic dump captured for feature {}", self.feature),
            1 => format!("Diagnostic dump {} feature failed for 1 daemon", self.feature),
            n => format!("Diagnostic dump {} feature failed for {n} daemons", self.feature),
        }
    }

    /// Text shown to the operator.
    ///
    /// Console sinks get the document followed by the summary; file sinks get
    /// the summary and where the file was collected.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        match &self.file {
            None => {
                out.push_str(&self.document);
                let _ = writeln!(out, "{}", self.summary());
            }
            Some(path) => {
                let _ = writeln!(out, "{}", self.summary());
                let _ = writeln!(
                    out,
                    "{} diagnostic-dump is collected at {}",
                    self.feature,
                    path.display()
                );
            }
        }
        out
    }
}

/// Single-feature diagnostic capture.
#[derive(Debug, Clone)]
pub struct DiagDumpEngine {
    registry: Arc<FeatureRegistry>,
    collector: DaemonCollector,
    output_dir: PathBuf,
    timeout: Duration,
}

impl DiagDumpEngine {
    /// Creates an engine writing file sinks under `output_dir`.
    #[must_use]
    pub fn new(
        registry: Arc<FeatureRegistry>,
        collector: DaemonCollector,
        output_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            collector,
            output_dir: output_dir.into(),
            timeout,
        }
    }

    /// Returns the file sink directory.
    #[must_use]
    pub fn output_dir(&self) -> &std::path::Path {
        &self.output_dir
    }

    /// Renders `diag-dump list`.
    ///
    /// # Errors
    /// [`SupportError::NoMapping`] when no mapping is loaded.
    pub fn list(&self) -> Result<String> {
        let table = self.registry.snapshot();
        if table.is_empty() {
            return Err(SupportError::NoMapping);
        }

        let mut out = String::new();
        let _ = writeln!(out, "{LIST_HEADER}");
        let _ = writeln!(out, "{DAEMON_RULE}");
        let _ = writeln!(out, "{:<40.40} {:<100.100}", "Feature", "Description");
        let _ = writeln!(out, "{DAEMON_RULE}");
        for feature in table.capturable() {
            let _ = writeln!(out, "{:<40.40} {:<100.100}", feature.name, feature.description);
        }
        Ok(out)
    }

    /// Captures basic diagnostics for `feature`.
    ///
    /// # Errors
    /// See [`DiagDumpEngine::dump_kind`].
    pub async fn dump(&self, feature: &str, sink: Sink) -> Result<DumpReport> {
        self.dump_kind(feature, CaptureKind::Basic, sink).await
    }

    /// Captures `kind` diagnostics for `feature` into `sink`.
    ///
    /// # Errors
    /// - [`SupportError::InvalidFileName`] for a bad file sink name
    /// - [`SupportError::NoMapping`] / [`SupportError::UnknownFeature`] /
    ///   [`SupportError::UnresolvedDaemon`] from resolution
    /// - [`SupportError::Communication`] when no daemon could be reached
    /// - [`SupportError::Storage`] when the file cannot be written
    pub async fn dump_kind(
        &self,
        feature: &str,
        kind: CaptureKind,
        sink: Sink,
    ) -> Result<DumpReport> {
        let mut states = vec![DumpState::Idle, DumpState::ResolvingFeature];

        if let Some(name) = sink.file_name() {
            sink::validate_file_name(name)?;
        }
        let entry = self.registry.lookup(feature).inspect_err(|e| {
            tracing::warn!(feature = %feature, error = %e, "diag-dump resolution failed");
        })?;
        let daemons: Vec<_> = entry.capturable_daemons().cloned().collect();
        if daemons.is_empty() {
            return Err(SupportError::UnresolvedDaemon(feature.to_string()));
        }

        states.push(DumpState::CollectingFromDaemon);
        let capture_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut payloads = Vec::new();
        let mut failures = Vec::new();
        let mut sections = Vec::with_capacity(daemons.len());

        for daemon in &daemons {
            match self
                .collector
                .collect(daemon, feature, kind, self.timeout)
                .await
            {
                Ok(payload) => {
                    tracing::debug!(%capture_id, daemon = %daemon.identifier, status = ?payload.status, "daemon answered");
                    sections.push(Section::Payload(payloads.len()));
                    payloads.push(payload);
                }
                Err(e) => {
                    tracing::error!(%capture_id, daemon = %daemon.identifier, error = %e, "daemon failed to capture diag dump");
                    sections.push(Section::Failure(failures.len()));
                    failures.push(e);
                }
            }
        }

        if payloads.is_empty() && !failures.is_empty() {
            return Err(SupportError::Communication(failures.swap_remove(0)));
        }

        states.push(DumpState::Formatting);
        let document = format_document(feature, &sections, &payloads, &failures);

        let file = match sink {
            Sink::Console => None,
            Sink::File(name) => {
                states.push(DumpState::Writing);
                let path =
                    sink::persist(self.output_dir.clone(), name, document.clone().into_bytes())
                        .await?;
                Some(path)
            }
        };
        states.push(DumpState::Idle);

        let report = DumpReport {
            capture_id,
            feature: feature.to_string(),
            kind,
            started_at,
            payloads,
            failures,
            document,
            file,
            states,
        };
        tracing::info!(
            %capture_id,
            feature = %feature,
            daemons = report.daemon_count(),
            failed = report.failed_count(),
            "diag-dump finished"
        );
        Ok(report)
    }
}

enum Section {
    Payload(usize),
    Failure(usize),
}

fn asctime() -> String {
    Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
}

fn format_document(
    feature: &str,
    sections: &[Section],
    payloads: &[DiagnosticPayload],
    failures: &[CollectorError],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[Start] Feature {feature} Time : {}", asctime());
    let _ = writeln!(out, "{FEATURE_RULE}");

    for section in sections {
        match section {
            Section::Payload(i) => {
                let payload = &payloads[*i];
                let _ = writeln!(out, "{DAEMON_RULE}");
                let _ = writeln!(out, "[Start] Daemon {}", payload.daemon);
                let _ = writeln!(out, "{DAEMON_RULE}");
                let body = payload.body_text();
                out.push_str(&body);
                if !body.ends_with('\n') {
                    out.push('\n');
                }
                let _ = writeln!(out, "{DAEMON_RULE}");
                let _ = writeln!(out, "[End] Daemon {}", payload.daemon);
                let _ = writeln!(out, "{DAEMON_RULE}");
            }
            Section::Failure(i) => {
                let _ = writeln!(out, "{DAEMON_RULE}");
                let _ = writeln!(out, "{}", failures[*i]);
                let _ = writeln!(out, "{DAEMON_RULE}");
            }
        }
    }

    let _ = writeln!(out, "{FEATURE_RULE}");
    let _ = writeln!(out, "[End] Feature {feature}");
    let _ = writeln!(out, "{FEATURE_RULE}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdiag_core::{
        ControlClient, ControlServer, DaemonRef, FeatureEntry, FeatureTable, RunningServer,
    };
    use std::collections::BTreeSet;

    struct Fixture {
        dir: tempfile::TempDir,
        _servers: Vec<RunningServer>,
        engine: DiagDumpEngine,
    }

    fn entry(name: &str, daemons: Vec<DaemonRef>) -> FeatureEntry {
        FeatureEntry {
            name: name.into(),
            description: format!("{name} feature"),
            daemons,
            capture_methods: BTreeSet::new(),
        }
    }

    /// `ops-lldpd` answers, `ops-lacpd` is not running.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let run = dir.path().join("run");
        std::fs::create_dir_all(&run).unwrap();
        let lldpd = ControlServer::new()
            .with_diag_dump(|feature| Some(format!("{feature}: 2 neighbors")))
            .bind(run.join("ops-lldpd.ctl"))
            .unwrap();
        let sysd = ControlServer::new()
            .with_diag_dump(|_| None)
            .bind(run.join("ops-sysd.ctl"))
            .unwrap();

        let table = FeatureTable::new(
            vec![
                entry("lldp", vec![DaemonRef::capturable("ops-lldpd")]),
                entry("lacp", vec![DaemonRef::capturable("ops-lacpd")]),
                entry(
                    "mixed",
                    vec![DaemonRef::capturable("ops-lldpd"), DaemonRef::capturable("ops-lacpd")],
                ),
                entry("sys", vec![DaemonRef::capturable("ops-sysd")]),
                entry(
                    "passive",
                    vec![DaemonRef {
                        identifier: "ops-lldpd".into(),
                        diag_dump: false,
                    }],
                ),
            ],
            Vec::new(),
        );
        let engine = DiagDumpEngine::new(
            Arc::new(FeatureRegistry::from_table(table)),
            DaemonCollector::new(Arc::new(ControlClient::new(&run))),
            dir.path().join("ops-diag"),
            Duration::from_secs(2),
        );
        Fixture {
            dir,
            _servers: vec![lldpd, sysd],
            engine,
        }
    }

    #[tokio::test]
    async fn test_console_dump() {
        let fx = fixture();
        let report = fx.engine.dump("lldp", Sink::Console).await.unwrap();
        assert!(report.complete());
        assert!(report.document.starts_with("[Start] Feature lldp Time : "));
        assert!(report.document.contains("[Start] Daemon ops-lldpd"));
        assert!(report.document.contains("lldp: 2 neighbors"));
        assert!(report.document.contains("[End] Feature lldp"));
        assert!(report.render().contains("Diagnostic dump captured for feature lldp"));
        assert_eq!(
            report.states,
            vec![
                DumpState::Idle,
                DumpState::ResolvingFeature,
                DumpState::CollectingFromDaemon,
                DumpState::Formatting,
                DumpState::Idle,
            ]
        );
    }

    #[tokio::test]
    async fn test_file_dump() {
        let fx = fixture();
        let report = fx
            .engine
            .dump("lldp", Sink::File("lldp.txt".into()))
            .await
            .unwrap();
        let path = fx.dir.path().join("ops-diag/lldp.txt");
        assert_eq!(report.file.as_deref(), Some(path.as_path()));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[Start] Feature"));
        assert!(report.states.contains(&DumpState::Writing));
        assert!(
            report
                .render()
                .contains(&format!("lldp diagnostic-dump is collected at {}", path.display()))
        );
    }

    #[tokio::test]
    async fn test_unreachable_daemon_fails_without_file() {
        let fx = fixture();
        let err = fx
            .engine
            .dump("lacp", Sink::File("lacp.txt".into()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "failed to connect daemon ops-lacpd");
        assert!(!fx.dir.path().join("ops-diag/lacp.txt").exists());
    }

    #[tokio::test]
    async fn test_partial_failure_reported_inline() {
        let fx = fixture();
        let report = fx.engine.dump("mixed", Sink::Console).await.unwrap();
        assert_eq!(report.daemon_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert!(report.document.contains("failed to connect daemon ops-lacpd"));
        assert_eq!(report.summary(), "Diagnostic dump mixed feature failed for 1 daemon");
    }

    #[tokio::test]
    async fn test_fail_payload_is_delivered() {
        let fx = fixture();
        let report = fx.engine.dump("sys", Sink::Console).await.unwrap();
        assert!(!report.complete());
        assert!(
            report
                .document
                .contains("sys feature failed to provide basic diagnostic data")
        );
    }

    #[tokio::test]
    async fn test_unknown_feature_never_contacts_daemons() {
        let fx = fixture();
        let err = fx
            .engine
            .dump("bogus", Sink::File("bogus.txt".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SupportError::UnknownFeature(_)));
        assert!(!fx.dir.path().join("ops-diag").exists());
    }

    #[tokio::test]
    async fn test_feature_without_capturable_daemon() {
        let fx = fixture();
        let err = fx.engine.dump("passive", Sink::Console).await.unwrap_err();
        assert!(matches!(err, SupportError::UnresolvedDaemon(_)));
    }

    #[tokio::test]
    async fn test_bad_file_name_rejected_first() {
        let fx = fixture();
        let err = fx
            .engine
            .dump("lldp", Sink::File("../escape".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, SupportError::InvalidFileName(_)));
    }

    #[tokio::test]
    async fn test_list() {
        let fx = fixture();
        let text = fx.engine.list().unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(LIST_HEADER));
        assert!(text.contains("lldp"));
        assert!(!text.lines().any(|l| l.starts_with("passive ")));
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let engine = DiagDumpEngine::new(
            Arc::new(FeatureRegistry::from_table(FeatureTable::default())),
            DaemonCollector::new(Arc::new(ControlClient::new("/nonexistent"))),
            "/nonexistent",
            Duration::from_secs(1),
        );
        assert!(matches!(engine.list(), Err(SupportError::NoMapping)));
        let err = engine.dump("lldp", Sink::Console).await.unwrap_err();
        assert!(matches!(err, SupportError::NoMapping));
    }
}
