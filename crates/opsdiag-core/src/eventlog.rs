//! Bounded, append-only event log.
//!
//! # Toyota Way: Genchi Genbutsu (現地現物)
//! Every state change worth an operator's attention becomes a record, with a
//! unique id that is never reused, even after the record is evicted.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

use crate::types::{EventCategory, Severity};

/// Printed when no record can match.
pub const NO_EVENTS_MESSAGE: &str = "No event has been logged in the system";

/// Printed when records exist but none match the filter.
pub const NO_MATCH_MESSAGE: &str = "No event match the filter provided";

/// Subscriber channel depth.
const SUBSCRIBER_BUFFER: usize = 256;

/// One event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique, strictly increasing id.
    pub id: u64,
    /// Insertion time.
    pub timestamp: DateTime<Utc>,
    /// Category.
    pub category: EventCategory,
    /// Severity.
    pub severity: Severity,
    /// Event type code (e.g. 14001 for a crash).
    pub event_code: u32,
    /// Message text.
    pub message: String,
}

impl EventRecord {
    /// Renders the record as an event log line.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "{}|ops-evt|{}|{}|{}|{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.event_code,
            self.category,
            self.severity.as_str().to_uppercase(),
            self.message
        )
    }
}

/// Query filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Every record.
    All,
    /// The record with this id.
    ById(u64),
    /// Records of one category.
    ByCategory(EventCategory),
    /// Records at this severity or more severe.
    BySeverity(Severity),
}

impl EventFilter {
    /// Returns true if `record` passes the filter.
    #[must_use]
    pub fn matches(&self, record: &EventRecord) -> bool {
        match self {
            Self::All => true,
            Self::ById(id) => record.id == *id,
            Self::ByCategory(category) => record.category == *category,
            Self::BySeverity(severity) => record.severity.is_at_least(*severity),
        }
    }

    /// Message explaining an empty result for this filter.
    #[must_use]
    pub const fn empty_message(&self) -> &'static str {
        match self {
            Self::All | Self::ById(_) => NO_EVENTS_MESSAGE,
            Self::ByCategory(_) | Self::BySeverity(_) => NO_MATCH_MESSAGE,
        }
    }
}

#[derive(Debug)]
struct Ring {
    records: VecDeque<EventRecord>,
    next_id: u64,
    evicted: u64,
}

/// Shared event log.
///
/// One short write-lock per record; queries take a read lock and copy out.
#[derive(Debug)]
pub struct EventLog {
    capacity: usize,
    ring: RwLock<Ring>,
    file: Option<Mutex<PathBuf>>,
    subscribers: broadcast::Sender<EventRecord>,
}

impl EventLog {
    /// Creates a log keeping at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (subscribers, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Self {
            capacity,
            ring: RwLock::new(Ring {
                records: VecDeque::with_capacity(capacity),
                next_id: 1,
                evicted: 0,
            }),
            file: None,
            subscribers,
        }
    }

    /// Also appends every rendered record to `path`.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.as_os_str().is_empty() {
            self.file = Some(Mutex::new(path));
        }
        self
    }

    /// Returns the configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a record with event code 0.
    pub fn record(
        &self,
        category: EventCategory,
        severity: Severity,
        message: impl Into<String>,
    ) -> EventRecord {
        self.record_coded(category, severity, 0, message)
    }

    /// Appends a record and assigns it the next id.
    pub fn record_coded(
        &self,
        category: EventCategory,
        severity: Severity,
        event_code: u32,
        message: impl Into<String>,
    ) -> EventRecord {
        let (record, file) = {
            let mut ring = self.ring.write();
            let record = EventRecord {
                id: ring.next_id,
                timestamp: Utc::now(),
                category,
                severity,
                event_code,
                message: message.into(),
            };
            ring.next_id += 1;
            if ring.records.len() == self.capacity {
                ring.records.pop_front();
                ring.evicted += 1;
            }
            ring.records.push_back(record.clone());
            let _ = self.subscribers.send(record.clone());
            // Taken before the ring is released so file lines stay in id order.
            (record, self.file.as_ref().map(|f| f.lock()))
        };

        tracing::debug!(id = record.id, category = %category, severity = %severity, "event recorded");
        if let Some(path) = file {
            append_line(&path, &record);
        }
        record
    }

    /// Returns matching records in insertion order.
    #[must_use]
    pub fn query(&self, filter: EventFilter) -> Vec<EventRecord> {
        self.ring
            .read()
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.read().records.len()
    }

    /// Returns true if nothing is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records evicted so far.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.ring.read().evicted
    }

    /// Receives every record appended after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.subscribers.subscribe()
    }
}

fn append_line(path: &Path, record: &EventRecord) {
    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(out, "{}", record.render())
    })();
    if let Err(e) = result {
        tracing::warn!(path = %path.display(), error = %e, "event log file write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ids_start_at_one() {
        let log = EventLog::new(8);
        let first = log.record(EventCategory::Lldp, Severity::Info, "LLDP Enabled");
        let second = log.record(EventCategory::Lldp, Severity::Info, "LLDP Disabled");
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[test]
    fn test_query_by_id() {
        let log = EventLog::new(8);
        let rec = log.record(EventCategory::Lacp, Severity::Warn, "LAG down");
        assert_eq!(log.query(EventFilter::ById(rec.id)), vec![rec]);
        assert!(log.query(EventFilter::ById(999998)).is_empty());
        assert_eq!(EventFilter::ById(999998).empty_message(), NO_EVENTS_MESSAGE);
    }

    #[test]
    fn test_query_by_severity_at_or_above() {
        let log = EventLog::new(8);
        log.record(EventCategory::Lldp, Severity::Info, "LLDP Enabled");
        log.record(EventCategory::System, Severity::Crit, "fan failed");
        log.record(EventCategory::System, Severity::Err, "psu degraded");

        let errs = log.query(EventFilter::BySeverity(Severity::Err));
        assert_eq!(errs.len(), 2);
        assert!(log.query(EventFilter::BySeverity(Severity::Emer)).is_empty());
        assert_eq!(EventFilter::BySeverity(Severity::Emer).empty_message(), NO_MATCH_MESSAGE);
    }

    #[test]
    fn test_query_by_category_keeps_order() {
        let log = EventLog::new(8);
        log.record(EventCategory::Lldp, Severity::Info, "a");
        log.record(EventCategory::Lacp, Severity::Info, "b");
        log.record(EventCategory::Lldp, Severity::Info, "c");
        let msgs: Vec<_> = log
            .query(EventFilter::ByCategory(EventCategory::Lldp))
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert_eq!(msgs, vec!["a", "c"]);
    }

    #[test]
    fn test_eviction_keeps_ids_unique() {
        let log = EventLog::new(2);
        let first = log.record(EventCategory::System, Severity::Info, "1");
        log.record(EventCategory::System, Severity::Info, "2");
        let third = log.record(EventCategory::System, Severity::Info, "3");

        assert_eq!(log.len(), 2);
        assert_eq!(log.evicted(), 1);
        assert!(log.query(EventFilter::ById(first.id)).is_empty());
        assert_eq!(third.id, 3);
    }

    #[test]
    fn test_render_crash_line() {
        let log = EventLog::new(4);
        let rec = log.record_coded(
            EventCategory::Supportability,
            Severity::Crit,
            crate::types::CRASH_EVENT_CODE,
            "ops-lldpd crashed due to Segmentation fault",
        );
        let line = rec.render();
        assert!(line.contains("|14001|"));
        assert!(line.contains("ops-evt"));
        assert!(line.ends_with("|CRIT|ops-lldpd crashed due to Segmentation fault"));
    }

    #[test]
    fn test_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log/event.log");
        let log = EventLog::new(4).with_file(&path);
        log.record(EventCategory::Lldp, Severity::Info, "LLDP Enabled");
        log.record(EventCategory::Lldp, Severity::Info, "LLDP Disabled");
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("LLDP Disabled"));
    }

    #[test]
    fn test_concurrent_records_reach_file_in_id_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.log");
        let log = EventLog::new(1024).with_file(&path);

        let records: Vec<EventRecord> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|t| {
                    let log = &log;
                    s.spawn(move || {
                        (0..50)
                            .map(|n| log.record(EventCategory::System, Severity::Info, format!("t{t}-{n}")))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers.into_iter().flat_map(|w| w.join().unwrap()).collect()
        });

        let id_of: std::collections::HashMap<String, u64> =
            records.into_iter().map(|r| (r.message, r.id)).collect();
        let text = std::fs::read_to_string(&path).unwrap();
        let ids: Vec<u64> = text
            .lines()
            .map(|line| id_of[line.rsplit('|').next().unwrap()])
            .collect();
        assert_eq!(ids.len(), 400);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_subscribe() {
        let log = EventLog::new(4);
        let mut rx = log.subscribe();
        log.record(EventCategory::Vlan, Severity::Notice, "vlan 10 created");
        let rec = rx.recv().await.unwrap();
        assert_eq!(rec.message, "vlan 10 created");
    }

    proptest! {
        #[test]
        fn prop_ids_strictly_increase(capacity in 1usize..16, count in 1usize..64) {
            let log = EventLog::new(capacity);
            let ids: Vec<u64> = (0..count)
                .map(|i| log.record(EventCategory::System, Severity::Info, i.to_string()).id)
                .collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(log.len() <= capacity);

            let held = log.query(EventFilter::All);
            prop_assert!(held.windows(2).all(|w| w[0].id < w[1].id));
        }
    }
}
