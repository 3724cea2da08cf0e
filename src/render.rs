//! Text rendering for the query commands.

use std::fmt::Write as _;

use opsdiag_core::{EventFilter, EventRecord, FeatureEntry, VlogDestination, VlogLevels};

const EVENT_RULE: &str = "---------------------------------------------------";
const VLOG_RULE: &str =
    "==================================================================================";

/// Renders `show events` output for `records` matched by `filter`.
#[must_use]
pub fn events(filter: EventFilter, records: &[EventRecord]) -> String {
    if records.is_empty() {
        return format!("{}\n", filter.empty_message());
    }
    let mut out = String::new();
    let _ = writeln!(out, "{EVENT_RULE}");
    let _ = writeln!(out, "show event logs");
    let _ = writeln!(out, "{EVENT_RULE}");
    for record in records {
        let _ = writeln!(out, "{:<8} {}", record.id, record.render());
    }
    out
}

fn level(levels: &VlogLevels, destination: VlogDestination) -> String {
    levels
        .get(&destination)
        .copied()
        .unwrap_or_default()
        .label()
        .to_string()
}

/// Renders one scope's levels under a `Feature` or `Daemon` heading.
#[must_use]
pub fn vlog_scope(heading: &str, name: &str, levels: &VlogLevels) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{VLOG_RULE}");
    let _ = writeln!(out, "{heading:<32} {:<12} {:<12}", "Syslog", "File");
    let _ = writeln!(out, "{VLOG_RULE}");
    let _ = writeln!(
        out,
        "{name:<32} {:<12} {:<12}",
        level(levels, VlogDestination::Syslog),
        level(levels, VlogDestination::File)
    );
    out
}

/// Renders `show vlog config list`.
#[must_use]
pub fn vlog_features(features: &[FeatureEntry]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{VLOG_RULE}");
    let _ = writeln!(out, "{:<32} {}", "Features", "Description");
    let _ = writeln!(out, "{VLOG_RULE}");
    for feature in features {
        let _ = writeln!(out, "{:<32} {}", feature.name, feature.description);
    }
    out
}

/// Renders the full `show vlog config` table: each feature followed by
/// its daemons.
#[must_use]
pub fn vlog_all<F>(features: &[FeatureEntry], mut levels_of: F) -> String
where
    F: FnMut(&opsdiag_core::VlogScope) -> VlogLevels,
{
    use opsdiag_core::VlogScope;

    let mut out = String::new();
    let _ = writeln!(out, "{VLOG_RULE}");
    let _ = writeln!(
        out,
        "{:<20} {:<24} {:<12} {:<12}",
        "Feature", "Daemon", "Syslog", "File"
    );
    let _ = writeln!(out, "{VLOG_RULE}");
    for feature in features {
        let levels = levels_of(&VlogScope::Feature(feature.name.clone()));
        let _ = writeln!(
            out,
            "{:<20} {:<24} {:<12} {:<12}",
            feature.name,
            "",
            level(&levels, VlogDestination::Syslog),
            level(&levels, VlogDestination::File)
        );
        for daemon in &feature.daemons {
            let levels = levels_of(&VlogScope::Daemon(daemon.identifier.clone()));
            let _ = writeln!(
                out,
                "{:<20} {:<24} {:<12} {:<12}",
                "",
                daemon.identifier,
                level(&levels, VlogDestination::Syslog),
                level(&levels, VlogDestination::File)
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdiag_core::{DaemonRef, EventCategory, Severity, VlogLevel};
    use regex::Regex;

    fn feature(name: &str, daemon: &str) -> FeatureEntry {
        FeatureEntry {
            name: name.into(),
            description: format!("{name} feature"),
            daemons: vec![DaemonRef::capturable(daemon)],
            capture_methods: Default::default(),
        }
    }

    #[test]
    fn test_empty_events_use_filter_message() {
        assert_eq!(
            events(EventFilter::ById(4), &[]),
            "No event has been logged in the system\n"
        );
        assert_eq!(
            events(EventFilter::BySeverity(Severity::Emer), &[]),
            "No event match the filter provided\n"
        );
    }

    #[test]
    fn test_event_rows_lead_with_id() {
        let record = EventRecord {
            id: 12,
            timestamp: chrono::Utc::now(),
            category: EventCategory::Lldp,
            severity: Severity::Info,
            event_code: 1002,
            message: "LLDP Enabled".into(),
        };
        let out = events(EventFilter::All, &[record]);
        assert!(out.contains("show event logs"));
        assert!(out.lines().any(|l| l.starts_with("12 ") && l.ends_with("|LLDP Enabled")));
    }

    #[test]
    fn test_vlog_scope_row() {
        let mut levels = VlogLevels::new();
        levels.insert(VlogDestination::Syslog, VlogLevel::Info);
        levels.insert(VlogDestination::File, VlogLevel::Dbg);
        let out = vlog_scope("Feature", "lacp", &levels);
        assert!(out.contains("Syslog"));
        assert!(Regex::new(r"lacp\s+INFO\s+DBG").unwrap().is_match(&out));
    }

    #[test]
    fn test_vlog_all_lists_features_then_daemons() {
        let features = vec![feature("lldp", "ops-lldpd")];
        let out = vlog_all(&features, |_| VlogLevels::new());
        assert!(out.contains("Feature"));
        assert!(out.contains("Daemon"));
        let lldp = out.find("lldp ").unwrap();
        let daemon = out.find("ops-lldpd").unwrap();
        assert!(lldp < daemon);
    }

    #[test]
    fn test_vlog_feature_list() {
        let out = vlog_features(&[feature("lldp", "ops-lldpd")]);
        assert!(out.contains("Features"));
        assert!(out.contains("Description"));
        assert!(out.contains("lldp feature"));
    }
}
