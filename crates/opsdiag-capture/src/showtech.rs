//! Show tech engine.
//!
//! A run resolves its scope to an ordered command plan, then executes the
//! plan sequentially through a [`CommandRunner`]. Per-command failures are
//! recorded inline and never abort the run.
//!
//! # Toyota Way: Heijunka (平準化)
//! Each command gets its own deadline and the run shares one overall budget;
//! commands that cannot start before the budget is spent are recorded as
//! skipped rather than stretching the run.

use chrono::{DateTime, Local, Utc};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use opsdiag_core::{FeatureRegistry, Result, ShowTechFeature, SupportError};

use crate::error::CommandError;
use crate::runner::CommandRunner;
use crate::sink::{self, Sink};

/// Header of `show tech list`.
pub const LIST_HEADER: &str = "Show Tech Supported Features List";

/// Trailer of a run where every configured command was attempted.
pub const SUCCESS_TRAILER: &str = "Show Tech commands executed successfully";

const RULE: &str = "====================================================";
const COMMAND_RULE: &str = "*********************************";

/// What a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowTechScope {
    /// Every configured feature, in mapping order.
    All,
    /// One feature, including its sub-features.
    Feature(String),
    /// One sub-feature of one feature.
    SubFeature(String, String),
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Ran; carries its output.
    Completed(String),
    /// Failed; carries the inline error text.
    Failed(String),
    /// Not started before the run budget was spent.
    Skipped,
}

/// One executed (or skipped) command.
#[derive(Debug, Clone)]
pub struct CommandRecord {
    /// Feature the command belongs to.
    pub feature: String,
    /// Sub-feature, if any.
    pub sub_feature: Option<String>,
    /// Command text.
    pub command: String,
    /// What happened.
    pub outcome: CommandOutcome,
    /// Time spent.
    pub elapsed: Duration,
}

/// Result of a show tech run.
#[derive(Debug, Clone)]
pub struct ShowTechReport {
    /// Unique id of this run.
    pub capture_id: Uuid,
    /// Scope requested.
    pub scope: ShowTechScope,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Commands in execution order.
    pub records: Vec<CommandRecord>,
    /// Rendered aggregate output, trailer included.
    pub document: String,
    /// Where a file sink was written.
    pub file: Option<PathBuf>,
}

impl ShowTechReport {
    /// Commands that failed inline.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, CommandOutcome::Failed(_)))
    }

    /// Commands skipped because the budget ran out.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, CommandOutcome::Skipped))
    }

    /// Returns true if every planned command was attempted.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.skipped() == 0
    }

    fn count(&self, pred: impl Fn(&CommandOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Text shown to the operator.
    #[must_use]
    pub fn render(&self) -> String {
        match &self.file {
            None => self.document.clone(),
            Some(path) => {
                let mut out = String::new();
                let _ = writeln!(out, "{}", trailer_line(self.completed(), self.skipped()));
                let _ = writeln!(out, "Show Tech output stored in file {}", path.display());
                out
            }
        }
    }
}

struct PlannedCommand {
    feature: String,
    sub_feature: Option<String>,
    command: String,
}

/// Multi-command diagnostic capture.
#[derive(Clone)]
pub struct ShowTechEngine {
    registry: Arc<FeatureRegistry>,
    runner: Arc<dyn CommandRunner>,
    output_dir: PathBuf,
    command_timeout: Duration,
    budget: Duration,
}

impl std::fmt::Debug for ShowTechEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShowTechEngine")
            .field("output_dir", &self.output_dir)
            .field("command_timeout", &self.command_timeout)
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl ShowTechEngine {
    /// Creates an engine writing file sinks under `output_dir`.
    #[must_use]
    pub fn new(
        registry: Arc<FeatureRegistry>,
        runner: Arc<dyn CommandRunner>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            runner,
            output_dir: output_dir.into(),
            command_timeout: Duration::from_secs(30),
            budget: Duration::from_secs(360),
        }
    }

    /// Sets the per-command deadline and the overall run budget.
    #[must_use]
    pub const fn with_timeouts(mut self, command_timeout: Duration, budget: Duration) -> Self {
        self.command_timeout = command_timeout;
        self.budget = budget;
        self
    }

    /// Renders `show tech list`.
    ///
    /// # Errors
    /// [`SupportError::Storage`] when no show tech mapping is loaded.
    pub fn list(&self) -> Result<String> {
        let table = self.registry.snapshot();
        if table.showtech().is_empty() {
            return Err(no_configuration());
        }

        let mut out = String::new();
        let _ = writeln!(out, "{LIST_HEADER}");
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, "{:<24} {}", "Feature", "Desc");
        let _ = writeln!(out, "{:<24} {}", "    Sub Feature", "Desc");
        let _ = writeln!(out, "{RULE}");
        for feature in table.showtech() {
            let _ = writeln!(out, "{:<24} {}", feature.name, feature.description);
            for sub in &feature.sub_features {
                let _ = writeln!(out, "    {:<20} {}", sub.name, sub.description);
            }
        }
        Ok(out)
    }

    /// Runs `scope` into `sink`.
    ///
    /// # Errors
    /// - [`SupportError::InvalidFileName`] for a bad file sink name
    /// - [`SupportError::UnknownFeature`] for an unknown feature
    /// - [`SupportError::UnknownSubFeature`] for a sub-feature not declared
    ///   under the feature
    /// - [`SupportError::Storage`] when nothing is configured or the file
    ///   cannot be written
    pub async fn run(&self, scope: ShowTechScope, sink: Sink) -> Result<ShowTechReport> {
        if let Some(name) = sink.file_name() {
            sink::validate_file_name(name)?;
        }
        let plan = self.plan(&scope)?;

        let capture_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(%capture_id, scope = ?scope, commands = plan.len(), "show tech started");

        let deadline = Instant::now() + self.budget;
        let mut records = Vec::with_capacity(plan.len());
        for step in plan {
            let begun = Instant::now();
            let outcome = if begun >= deadline {
                CommandOutcome::Skipped
            } else {
                let limit = self.command_timeout.min(deadline - begun);
                match tokio::time::timeout(limit, self.runner.run(&step.command)).await {
                    Ok(Ok(output)) => CommandOutcome::Completed(output),
                    Ok(Err(e)) => CommandOutcome::Failed(e.to_string()),
                    Err(_) => CommandOutcome::Failed(CommandError::Timeout(limit).to_string()),
                }
            };
            if let CommandOutcome::Failed(reason) = &outcome {
                tracing::warn!(%capture_id, command = %step.command, reason = %reason, "show tech command failed");
            }
            records.push(CommandRecord {
                feature: step.feature,
                sub_feature: step.sub_feature,
                command: step.command,
                outcome,
                elapsed: begun.elapsed(),
            });
        }

        let document = format_document(&records);
        let file = match sink {
            Sink::Console => None,
            Sink::File(name) => Some(
                sink::persist(self.output_dir.clone(), name, document.clone().into_bytes()).await?,
            ),
        };

        let report = ShowTechReport {
            capture_id,
            scope,
            started_at,
            records,
            document,
            file,
        };
        tracing::info!(
            %capture_id,
            commands = report.records.len(),
            failed = report.failed(),
            skipped = report.skipped(),
            "show tech finished"
        );
        Ok(report)
    }

    fn plan(&self, scope: &ShowTechScope) -> Result<Vec<PlannedCommand>> {
        let table = self.registry.snapshot();
        if table.showtech().is_empty() {
            return Err(no_configuration());
        }

        let mut plan = Vec::new();
        match scope {
            ShowTechScope::All => {
                for feature in table.showtech() {
                    push_feature(&mut plan, feature);
                }
            }
            ShowTechScope::Feature(name) => {
                let entries = table.showtech_entries(name);
                if entries.is_empty() {
                    return Err(SupportError::UnknownFeature(name.clone()));
                }
                for feature in entries {
                    push_feature(&mut plan, feature);
                }
            }
            ShowTechScope::SubFeature(name, sub) => {
                let mut found = false;
                for feature in table.showtech_entries(name) {
                    if let Some(entry) = feature.sub_feature(sub) {
                        found = true;
                        for command in &entry.commands {
                            plan.push(PlannedCommand {
                                feature: feature.name.clone(),
                                sub_feature: Some(entry.name.clone()),
                                command: command.clone(),
                            });
                        }
                    }
                }
                if !found {
                    return Err(SupportError::UnknownSubFeature(sub.clone()));
                }
            }
        }
        Ok(plan)
    }
}

fn no_configuration() -> SupportError {
    SupportError::storage("Failed to obtain Show Tech configuration")
}

fn push_feature(plan: &mut Vec<PlannedCommand>, feature: &ShowTechFeature) {
    for command in &feature.commands {
        plan.push(PlannedCommand {
            feature: feature.name.clone(),
            sub_feature: None,
            command: command.clone(),
        });
    }
    for sub in &feature.sub_features {
        for command in &sub.commands {
            plan.push(PlannedCommand {
                feature: feature.name.clone(),
                sub_feature: Some(sub.name.clone()),
                command: command.clone(),
            });
        }
    }
}

fn trailer_line(completed: bool, skipped: usize) -> String {
    if completed {
        SUCCESS_TRAILER.to_string()
    } else {
        format!("Show Tech run budget exhausted, {skipped} command(s) skipped")
    }
}

fn format_document(records: &[CommandRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(
        out,
        "Show Tech executed on {}",
        Local::now().format("%a %b %e %H:%M:%S %Y")
    );
    let _ = writeln!(out, "{RULE}");

    let mut current: Option<&str> = None;
    for record in records {
        if current != Some(record.feature.as_str()) {
            if let Some(previous) = current {
                feature_banner(&mut out, "[End] Feature", previous);
            }
            feature_banner(&mut out, "[Begin] Feature", &record.feature);
            current = Some(&record.feature);
        }

        let _ = writeln!(out, "\n{COMMAND_RULE}");
        let _ = writeln!(out, "Command : {}", record.command);
        let _ = writeln!(out, "{COMMAND_RULE}");
        match &record.outcome {
            CommandOutcome::Completed(output) => {
                out.push_str(output);
                if !output.is_empty() && !output.ends_with('\n') {
                    out.push('\n');
                }
            }
            CommandOutcome::Failed(reason) => {
                let _ = writeln!(out, "{reason}");
            }
            CommandOutcome::Skipped => {
                let _ = writeln!(out, "Skipped: show tech run budget exhausted");
            }
        }
    }
    if let Some(previous) = current {
        feature_banner(&mut out, "[End] Feature", previous);
    }

    let skipped = records
        .iter()
        .filter(|r| r.outcome == CommandOutcome::Skipped)
        .count();
    feature_banner(&mut out, &trailer_line(skipped == 0, skipped), "");
    out
}

fn feature_banner(out: &mut String, label: &str, feature: &str) {
    let _ = writeln!(out, "{RULE}");
    if feature.is_empty() {
        let _ = writeln!(out, "{label}");
    } else {
        let _ = writeln!(out, "{label} {feature}");
    }
    let _ = writeln!(out, "{RULE}");
}
