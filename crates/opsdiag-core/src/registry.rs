//! Feature registry: logical feature names mapped to owning daemons and
//! show tech command lists.
//!
//! Two operator-editable YAML files feed the registry. Both are parsed
//! tolerantly: a missing or empty file yields an empty table, and a corrupt
//! file keeps every entry parsed before the damage. The serving process stays
//! responsive either way.
//!
//! # Toyota Way: Poka-Yoke (ポカヨケ)
//! A table is immutable once built. Readers take an `Arc` snapshot, and
//! a reload swaps the whole table, so no reader ever sees a half-built
//! mapping.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{Result, SupportError};
use crate::types::{FEATURE_DESC_MAX, FEATURE_NAME_MAX, truncate_chars};

// =============================================================================
// Entries
// =============================================================================

/// How a feature's diagnostics can be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMethod {
    /// Single-feature capture from the owning daemons.
    DiagDump,
    /// Command list executed by show tech.
    ShowTech,
}

/// Reference to a daemon owning part of a feature.
///
/// The control channel itself is resolved lazily by the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonRef {
    /// Daemon identifier (process name, e.g. `ops-lldpd`).
    pub identifier: String,
    /// Whether the daemon answers diag-dump requests.
    pub diag_dump: bool,
}

impl DaemonRef {
    /// Creates a capturable daemon reference.
    #[must_use]
    pub fn capturable(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            diag_dump: true,
        }
    }
}

/// A feature from the diag-dump mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEntry {
    /// Unique feature name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Owning daemons in mapping order.
    pub daemons: Vec<DaemonRef>,
    /// Supported capture methods.
    pub capture_methods: BTreeSet<CaptureMethod>,
}

impl FeatureEntry {
    /// Returns true if `diag-dump` advertises this feature.
    #[must_use]
    pub fn is_capturable(&self) -> bool {
        self.capture_methods.contains(&CaptureMethod::DiagDump)
    }

    /// Daemons that answer diag-dump requests.
    pub fn capturable_daemons(&self) -> impl Iterator<Item = &DaemonRef> {
        self.daemons.iter().filter(|d| d.diag_dump)
    }

    /// Returns true if `daemon` owns part of this feature.
    #[must_use]
    pub fn owns(&self, daemon: &str) -> bool {
        self.daemons.iter().any(|d| d.identifier == daemon)
    }
}

/// A sub-feature of a show tech feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowTechSubFeature {
    /// Sub-feature name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Commands in execution order.
    pub commands: Vec<String>,
}

/// A feature from the show tech mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowTechFeature {
    /// Feature name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Commands in execution order.
    pub commands: Vec<String>,
    /// Declared sub-features.
    pub sub_features: Vec<ShowTechSubFeature>,
}

impl ShowTechFeature {
    /// Finds a declared sub-feature.
    #[must_use]
    pub fn sub_feature(&self, name: &str) -> Option<&ShowTechSubFeature> {
        self.sub_features.iter().find(|s| s.name == name)
    }
}

// =============================================================================
// FeatureTable
// =============================================================================

/// Locations of the two mapping resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingSources {
    /// Diag-dump feature mapping.
    pub feature_mapping: PathBuf,
    /// Show tech mapping.
    pub showtech_mapping: PathBuf,
}

/// Immutable snapshot of both mappings.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    features: Vec<FeatureEntry>,
    showtech: Vec<ShowTechFeature>,
    load_errors: Vec<String>,
}

impl FeatureTable {
    /// Builds a table from already-parsed parts.
    #[must_use]
    pub fn new(features: Vec<FeatureEntry>, showtech: Vec<ShowTechFeature>) -> Self {
        let mut table = Self {
            features,
            showtech,
            load_errors: Vec::new(),
        };
        table.link_capture_methods();
        table
    }

    /// Loads both mapping files.
    ///
    /// A missing file contributes nothing. Parse damage is recorded in
    /// [`FeatureTable::load_errors`] and the entries before it are kept.
    ///
    /// # Errors
    /// Returns a storage error only when a file exists but cannot be read.
    pub fn load(sources: &MappingSources) -> Result<Self> {
        let mut load_errors = Vec::new();

        let features = match read_optional(&sources.feature_mapping)? {
            Some(text) => {
                let (features, error) = parse_feature_mapping(&text);
                load_errors.extend(error);
                features
            }
            None => Vec::new(),
        };

        let showtech = match read_optional(&sources.showtech_mapping)? {
            Some(text) => {
                let (showtech, errors) = parse_showtech_mapping(&text);
                load_errors.extend(errors);
                showtech
            }
            None => Vec::new(),
        };

        let mut table = Self {
            features,
            showtech,
            load_errors,
        };
        table.link_capture_methods();
        Ok(table)
    }

    fn link_capture_methods(&mut self) {
        let showtech_names: BTreeSet<&str> = self.showtech.iter().map(|f| f.name.as_str()).collect();
        for feature in &mut self.features {
            if feature.daemons.iter().any(|d| d.diag_dump) {
                feature.capture_methods.insert(CaptureMethod::DiagDump);
            }
            if showtech_names.contains(feature.name.as_str()) {
                feature.capture_methods.insert(CaptureMethod::ShowTech);
            }
        }
    }

    /// Looks up a diag-dump feature by exact name.
    ///
    /// # Errors
    /// [`SupportError::NoMapping`] for an empty table,
    /// [`SupportError::UnknownFeature`] for an unknown name.
    pub fn lookup(&self, name: &str) -> Result<&FeatureEntry> {
        if self.features.is_empty() {
            return Err(SupportError::NoMapping);
        }
        self.features
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| SupportError::UnknownFeature(name.to_string()))
    }

    /// All diag-dump features in mapping order.
    #[must_use]
    pub fn list(&self) -> &[FeatureEntry] {
        &self.features
    }

    /// Features advertised by `diag-dump list`.
    pub fn capturable(&self) -> impl Iterator<Item = &FeatureEntry> {
        self.features.iter().filter(|f| f.is_capturable())
    }

    /// Finds the feature owning `daemon`, if any.
    #[must_use]
    pub fn feature_of_daemon(&self, daemon: &str) -> Option<&FeatureEntry> {
        self.features.iter().find(|f| f.owns(daemon))
    }

    /// Returns true if no diag-dump feature is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// All show tech entries, duplicates included.
    #[must_use]
    pub fn showtech(&self) -> &[ShowTechFeature] {
        &self.showtech
    }

    /// Every show tech entry named `name`, in mapping order.
    #[must_use]
    pub fn showtech_entries(&self, name: &str) -> Vec<&ShowTechFeature> {
        self.showtech.iter().filter(|f| f.name == name).collect()
    }

    /// Parse problems met while loading.
    #[must_use]
    pub fn load_errors(&self) -> &[String] {
        &self.load_errors
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SupportError::storage(format!(
            "failed to read {}: {e}",
            path.display()
        ))),
    }
}

// =============================================================================
// Parsing
// =============================================================================

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar).collect(),
        Some(other) => scalar(other).into_iter().collect(),
        None => Vec::new(),
    }
}

fn flag_enabled(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        other => scalar(other).is_some_and(|s| s == "y"),
    }
}

/// Parses one daemon entry: a plain name, a map, or a flow list of pairs.
fn parse_daemon(value: &Value) -> Option<DaemonRef> {
    let pairs: Vec<(&Value, &Value)> = match value {
        Value::String(name) => {
            return Some(DaemonRef {
                identifier: name.clone(),
                diag_dump: false,
            });
        }
        Value::Mapping(map) => map.iter().collect(),
        Value::Sequence(items) => items
            .iter()
            .filter_map(Value::as_mapping)
            .flat_map(|map| map.iter())
            .collect(),
        _ => return None,
    };

    let mut identifier = None;
    let mut diag_dump = false;
    for (key, val) in pairs {
        match key.as_str() {
            Some("name") => identifier = scalar(val),
            Some("diag_dump") => diag_dump = flag_enabled(val),
            _ => {}
        }
    }

    identifier
        .filter(|id| !id.is_empty())
        .map(|identifier| DaemonRef {
            identifier,
            diag_dump,
        })
}

fn collect_features(document: &Value, out: &mut Vec<FeatureEntry>) {
    let entries: Vec<&Value> = match document {
        Value::Sequence(items) => items.iter().collect(),
        Value::Mapping(_) => vec![document],
        _ => return,
    };

    for entry in entries {
        let Value::Mapping(map) = entry else { continue };
        let Some(name) = map.get("feature_name").and_then(scalar) else {
            continue;
        };
        let name = truncate_chars(name.trim(), FEATURE_NAME_MAX);
        if name.is_empty() {
            continue;
        }
        if out.iter().any(|f| f.name == name) {
            tracing::warn!(feature = %name, "duplicate feature in mapping ignored");
            continue;
        }

        let description = map
            .get("feature_desc")
            .and_then(scalar)
            .map(|d| truncate_chars(&d, FEATURE_DESC_MAX))
            .unwrap_or_default();

        let daemons = match map.get("daemon") {
            Some(Value::Sequence(items)) => items.iter().filter_map(parse_daemon).collect(),
            Some(single) => parse_daemon(single).into_iter().collect(),
            None => Vec::new(),
        };

        out.push(FeatureEntry {
            name,
            description,
            daemons,
            capture_methods: BTreeSet::new(),
        });
    }
}

/// Parses the diag-dump mapping text.
///
/// Documents are consumed in order; the first damaged document stops the
/// parse and its error is returned alongside the features already read.
#[must_use]
pub fn parse_feature_mapping(text: &str) -> (Vec<FeatureEntry>, Option<String>) {
    let mut features = Vec::new();

    for document in serde_yaml::Deserializer::from_str(text) {
        match Value::deserialize(document) {
            Ok(value) => collect_features(&value, &mut features),
            Err(e) => {
                tracing::warn!(error = %e, parsed = features.len(), "feature mapping is corrupt");
                return (features, Some(e.to_string()));
            }
        }
    }

    (features, None)
}

fn parse_showtech_entry(value: &Value) -> Option<ShowTechFeature> {
    let Value::Mapping(map) = value else {
        return None;
    };
    let name = map.get("feature_name").and_then(scalar)?;
    let sub_features = match map.get("sub_feature") {
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(|item| {
                let Value::Mapping(sub) = item else {
                    return None;
                };
                Some(ShowTechSubFeature {
                    name: sub.get("sub_feature_name").and_then(scalar)?,
                    description: sub
                        .get("sub_feature_desc")
                        .and_then(scalar)
                        .unwrap_or_default(),
                    commands: string_list(sub.get("cli_cmds")),
                })
            })
            .collect(),
        _ => Vec::new(),
    };

    Some(ShowTechFeature {
        name,
        description: map.get("feature_desc").and_then(scalar).unwrap_or_default(),
        commands: string_list(map.get("cli_cmds")),
        sub_features,
    })
}

fn dedent(lines: &[&str]) -> String {
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| l.get(indent..).unwrap_or_else(|| l.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses the show tech mapping text.
///
/// The file is a series of `feature:` blocks; a block may repeat, and every
/// block's entries are appended in order. A block that does not parse is
/// skipped and reported.
#[must_use]
pub fn parse_showtech_mapping(text: &str) -> (Vec<ShowTechFeature>, Vec<String>) {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed == "---" || trimmed == "..." {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("feature:") {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            let rest = rest.trim();
            current = Some(if rest.is_empty() { Vec::new() } else { vec![rest] });
            continue;
        }
        if let Some(block) = current.as_mut() {
            block.push(line);
        }
    }
    blocks.extend(current);

    let mut features = Vec::new();
    let mut errors = Vec::new();

    for (index, block) in blocks.iter().enumerate() {
        let source = dedent(block);
        match serde_yaml::from_str::<Value>(&source) {
            Ok(Value::Sequence(items)) => {
                features.extend(items.iter().filter_map(parse_showtech_entry));
            }
            Ok(Value::Null) => {}
            Ok(other) => {
                features.extend(parse_showtech_entry(&other));
            }
            Err(e) => {
                tracing::warn!(block = index, error = %e, "show tech mapping block skipped");
                errors.push(format!("show tech block {index}: {e}"));
            }
        }
    }

    (features, errors)
}

// =============================================================================
// FeatureRegistry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

fn stamp(path: &Path) -> Option<FileStamp> {
    std::fs::metadata(path).ok().map(|meta| FileStamp {
        modified: meta.modified().ok(),
        len: meta.len(),
    })
}

/// Shared owner of the current [`FeatureTable`].
#[derive(Debug)]
pub struct FeatureRegistry {
    sources: MappingSources,
    table: RwLock<Arc<FeatureTable>>,
    stamps: Mutex<(Option<FileStamp>, Option<FileStamp>)>,
    reload_on_change: bool,
}

impl FeatureRegistry {
    /// Creates a registry and performs the initial load.
    #[must_use]
    pub fn open(sources: MappingSources) -> Self {
        let registry = Self {
            sources,
            table: RwLock::new(Arc::new(FeatureTable::default())),
            stamps: Mutex::new((None, None)),
            reload_on_change: false,
        };
        registry.reload();
        registry
    }

    /// Creates a registry around a fixed table (no backing files).
    #[must_use]
    pub fn from_table(table: FeatureTable) -> Self {
        Self {
            sources: MappingSources {
                feature_mapping: PathBuf::new(),
                showtech_mapping: PathBuf::new(),
            },
            table: RwLock::new(Arc::new(table)),
            stamps: Mutex::new((None, None)),
            reload_on_change: false,
        }
    }

    /// Enables reloading when a mapping file's metadata changes.
    #[must_use]
    pub const fn with_reload_on_change(mut self, enabled: bool) -> Self {
        self.reload_on_change = enabled;
        self
    }

    /// Reloads both mappings and swaps the table.
    ///
    /// An unreadable file degrades to an empty table.
    pub fn reload(&self) -> Arc<FeatureTable> {
        let table = match FeatureTable::load(&self.sources) {
            Ok(table) => table,
            Err(e) => {
                tracing::error!(error = %e, "feature mapping unavailable");
                FeatureTable::default()
            }
        };
        tracing::info!(
            features = table.list().len(),
            showtech = table.showtech().len(),
            errors = table.load_errors().len(),
            "feature registry loaded"
        );

        *self.stamps.lock() = (
            stamp(&self.sources.feature_mapping),
            stamp(&self.sources.showtech_mapping),
        );
        let table = Arc::new(table);
        *self.table.write() = Arc::clone(&table);
        table
    }

    /// Returns the current table, refreshing first if enabled and changed.
    pub fn snapshot(&self) -> Arc<FeatureTable> {
        if self.reload_on_change {
            let current = (
                stamp(&self.sources.feature_mapping),
                stamp(&self.sources.showtech_mapping),
            );
            if *self.stamps.lock() != current {
                tracing::debug!("feature mapping changed on disk");
                return self.reload();
            }
        }
        Arc::clone(&self.table.read())
    }

    /// Looks up a diag-dump feature.
    ///
    /// # Errors
    /// See [`FeatureTable::lookup`].
    pub fn lookup(&self, name: &str) -> Result<FeatureEntry> {
        self.snapshot().lookup(name).cloned()
    }

    /// All diag-dump features in mapping order.
    #[must_use]
    pub fn list(&self) -> Vec<FeatureEntry> {
        self.snapshot().list().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MAPPING: &str = r#"---
  -
    feature_name: "lldp"
    feature_desc: "Link Layer Discovery Protocol"
    daemon:
     - [name: "ops-lldpd", "diag_dump":"y"]
  -
    feature_name: "lacp"
    feature_desc: "Link Aggregation Control Protocol"
    daemon:
     - [name: "ops-lacpd", "diag_dump":"y"]
  -
    feature_name: "fan"
    feature_desc: "Fan"
    daemon:
     - [name: "ops-fand", "diag_dump":"n"]
"#;

    const SHOWTECH: &str = r#"---
  feature:
  -
    feature_desc: "Link Layer Discovery Protocol"
    feature_name: lldp
    cli_cmds:
      - "show lldp configuration"
      - "show lldp neighbor-info"
    sub_feature:
    -
      sub_feature_name: statistics
      sub_feature_desc: "LLDP statistics"
      cli_cmds:
        - "show lldp statistics"
  -
    feature_desc: "Link Aggregation"
    feature_name: LAG
    cli_cmds:
      - "show lacp aggregates"
"#;

    fn write(dir: &tempfile::TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_parse_flow_pair_daemons() {
        let (features, error) = parse_feature_mapping(MAPPING);
        assert!(error.is_none());
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].name, "lldp");
        assert_eq!(features[0].daemons, vec![DaemonRef::capturable("ops-lldpd")]);
        assert!(!features[2].daemons[0].diag_dump);
    }

    #[test]
    fn test_parse_map_and_plain_daemons() {
        let text = "- feature_name: vrf\n  daemon:\n    - name: ops-vrfd\n      diag_dump: y\n    - ops-helper\n";
        let (features, _) = parse_feature_mapping(text);
        assert_eq!(features[0].daemons.len(), 2);
        assert!(features[0].daemons[0].diag_dump);
        assert_eq!(features[0].daemons[1].identifier, "ops-helper");
        assert!(!features[0].daemons[1].diag_dump);
    }

    #[test]
    fn test_parse_truncates_long_names() {
        let name = "f".repeat(45);
        let desc = "d".repeat(150);
        let text = format!("- feature_name: {name}\n  feature_desc: {desc}\n");
        let (features, _) = parse_feature_mapping(&text);
        assert_eq!(features[0].name.len(), FEATURE_NAME_MAX);
        assert_eq!(features[0].description.len(), FEATURE_DESC_MAX);
    }

    #[test]
    fn test_parse_keeps_entries_before_corruption() {
        let text = format!("{MAPPING}---\n- feature_name: \"lldp\" daemon: - [: broken\n");
        let (features, error) = parse_feature_mapping(&text);
        assert_eq!(features.len(), 3);
        assert!(error.is_some());
    }

    #[test]
    fn test_parse_empty_text() {
        let (features, error) = parse_feature_mapping("");
        assert!(features.is_empty());
        assert!(error.is_none());
    }

    #[test]
    fn test_duplicate_feature_keeps_first() {
        let text = format!("{MAPPING}---\n- feature_name: lldp\n  feature_desc: other\n");
        let (features, _) = parse_feature_mapping(&text);
        let lldp: Vec<_> = features.iter().filter(|f| f.name == "lldp").collect();
        assert_eq!(lldp.len(), 1);
        assert_eq!(lldp[0].description, "Link Layer Discovery Protocol");
    }

    #[test]
    fn test_showtech_blocks() {
        let (features, errors) = parse_showtech_mapping(SHOWTECH);
        assert!(errors.is_empty());
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].commands.len(), 2);
        assert_eq!(
            features[0].sub_feature("statistics").unwrap().commands,
            vec!["show lldp statistics".to_string()]
        );
        assert_eq!(features[1].name, "LAG");
    }

    #[test]
    fn test_showtech_appended_duplicate_blocks() {
        let appended = "\n  feature:\n  -\n    feature_desc: \"sttest\"\n    feature_name: test1234\n    cli_cmds:\n      - \"show testing\"";
        let text = format!("{SHOWTECH}{appended}{appended}");
        let (features, errors) = parse_showtech_mapping(&text);
        assert!(errors.is_empty());
        let tests: Vec<_> = features.iter().filter(|f| f.name == "test1234").collect();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].commands, vec!["show testing".to_string()]);
    }

    #[test]
    fn test_showtech_bad_block_skipped() {
        let text = format!("{SHOWTECH}\n  feature:\n  - [unclosed\n");
        let (features, errors) = parse_showtech_mapping(&text);
        assert_eq!(features.len(), 2);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_table_lookup_and_capture_methods() {
        let dir = tempfile::tempdir().unwrap();
        let sources = MappingSources {
            feature_mapping: write(&dir, "map.yaml", MAPPING),
            showtech_mapping: write(&dir, "showtech.yaml", SHOWTECH),
        };
        let table = FeatureTable::load(&sources).unwrap();

        let lldp = table.lookup("lldp").unwrap();
        assert!(lldp.capture_methods.contains(&CaptureMethod::DiagDump));
        assert!(lldp.capture_methods.contains(&CaptureMethod::ShowTech));
        assert!(!table.lookup("fan").unwrap().is_capturable());
        assert_eq!(table.capturable().count(), 2);
        assert!(matches!(
            table.lookup("LLDP"),
            Err(SupportError::UnknownFeature(_))
        ));
        assert_eq!(table.feature_of_daemon("ops-lacpd").unwrap().name, "lacp");
    }

    #[test]
    fn test_missing_files_give_empty_table() {
        let sources = MappingSources {
            feature_mapping: PathBuf::from("/nonexistent/map.yaml"),
            showtech_mapping: PathBuf::from("/nonexistent/showtech.yaml"),
        };
        let table = FeatureTable::load(&sources).unwrap();
        assert!(table.is_empty());
        assert!(matches!(table.lookup("lldp"), Err(SupportError::NoMapping)));
    }

    #[test]
    fn test_registry_reload_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let sources = MappingSources {
            feature_mapping: write(&dir, "map.yaml", ""),
            showtech_mapping: dir.path().join("missing.yaml"),
        };
        let registry = FeatureRegistry::open(sources).with_reload_on_change(true);
        assert!(registry.list().is_empty());

        write(&dir, "map.yaml", MAPPING);
        assert_eq!(registry.list().len(), 3);
        assert!(registry.lookup("lacp").is_ok());
    }

    #[test]
    fn test_registry_explicit_reload() {
        let dir = tempfile::tempdir().unwrap();
        let sources = MappingSources {
            feature_mapping: write(&dir, "map.yaml", MAPPING),
            showtech_mapping: dir.path().join("missing.yaml"),
        };
        let registry = FeatureRegistry::open(sources);
        assert_eq!(registry.list().len(), 3);

        write(&dir, "map.yaml", "");
        assert_eq!(registry.list().len(), 3);
        registry.reload();
        assert!(registry.list().is_empty());
    }
}
