//! Syslog line model and RFC 5424 formatting.

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use std::sync::LazyLock;

use opsdiag_core::{EventRecord, Severity};

/// Facility `user` (1).
pub const FACILITY_USER: u8 = 1;

/// Facility `daemon` (3).
pub const FACILITY_DAEMON: u8 = 3;

/// Facility `local7` (23).
pub const FACILITY_LOCAL7: u8 = 23;

/// RFC 5424 nil value.
const NIL: &str = "-";

/// RFC 5424 caps APP-NAME at 48 printable characters.
const APP_NAME_MAX: usize = 48;

#[allow(clippy::expect_used)]
static BSD_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Z][a-z]{2} [ 0-9]\d \d{2}:\d{2}:\d{2} )?(?:(?P<tag>[^\s:\[]+)(?:\[\d+\])?: )?(?P<msg>.*)$")
        .expect("bsd syslog pattern is valid")
});

/// One log line to forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Origination time.
    pub timestamp: DateTime<Utc>,
    /// Syslog facility code.
    pub facility: u8,
    /// Severity.
    pub severity: Severity,
    /// APP-NAME; `-` when unknown.
    pub app: String,
    /// Message text.
    pub message: String,
}

impl LogLine {
    /// Creates a line stamped now.
    #[must_use]
    pub fn new(
        facility: u8,
        severity: Severity,
        app: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            facility,
            severity,
            app: app.into(),
            message: message.into(),
        }
    }

    /// PRI value: facility * 8 + severity.
    #[must_use]
    pub fn priority(&self) -> u16 {
        u16::from(self.facility.min(23)) * 8 + u16::from(self.severity.as_syslog())
    }

    /// Formats the line as RFC 5424 without a trailing newline.
    #[must_use]
    pub fn to_rfc5424(&self, hostname: &str) -> String {
        let app = sanitize(&self.app, APP_NAME_MAX);
        let host = sanitize(hostname, 255);
        format!(
            "<{}>1 {} {} {} {NIL} {NIL} {NIL} {}",
            self.priority(),
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            host,
            app,
            self.message.replace(['\n', '\r'], " "),
        )
    }

    /// Parses a datagram received on the local syslog socket.
    ///
    /// Accepts an optional `<PRI>` prefix followed by an optional BSD
    /// timestamp and `TAG[pid]:` header, as written by `logger`. Missing
    /// parts default to facility user and severity notice.
    #[must_use]
    pub fn parse_local(datagram: &str) -> Self {
        let raw = datagram.trim_end_matches(['\n', '\r', '\0']);
        let (pri, rest) = split_pri(raw);
        let (facility, severity) = pri.map_or((FACILITY_USER, Severity::Notice), decode_pri);

        let (app, message) = BSD_HEADER.captures(rest).map_or_else(
            || (NIL.to_string(), rest.to_string()),
            |caps| {
                let app = caps.name("tag").map_or(NIL, |m| m.as_str());
                let msg = caps.name("msg").map_or(rest, |m| m.as_str());
                (app.to_string(), msg.to_string())
            },
        );
        Self::new(facility, severity, app, message)
    }
}

impl From<&EventRecord> for LogLine {
    fn from(record: &EventRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            facility: FACILITY_LOCAL7,
            severity: record.severity,
            app: "ops-evt".to_string(),
            message: format!(
                "{}|{}|{}|{}",
                record.event_code,
                record.category,
                record.severity.as_str().to_uppercase(),
                record.message
            ),
        }
    }
}

fn split_pri(raw: &str) -> (Option<u8>, &str) {
    let Some(body) = raw.strip_prefix('<') else {
        return (None, raw);
    };
    match body.split_once('>') {
        Some((digits, rest)) if (1..=3).contains(&digits.len()) => {
            match digits.parse::<u8>() {
                Ok(pri) if pri <= 191 => (Some(pri), rest),
                _ => (None, raw),
            }
        }
        _ => (None, raw),
    }
}

fn decode_pri(pri: u8) -> (u8, Severity) {
    let severity = Severity::ALL
        .get(usize::from(pri % 8))
        .copied()
        .unwrap_or(Severity::Notice);
    (pri / 8, severity)
}

/// RFC 5424 header fields are printable US-ASCII without spaces.
fn sanitize(field: &str, max: usize) -> String {
    let cleaned: String = field
        .chars()
        .filter(|c| c.is_ascii_graphic())
        .take(max)
        .collect();
    if cleaned.is_empty() {
        NIL.to_string()
    } else {
        cleaned
    }
}

/// Host name written into forwarded lines.
#[must_use]
pub fn local_hostname() -> String {
    nix::unistd::gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| NIL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use opsdiag_core::EventCategory;
    use proptest::prelude::*;

    fn fixed(severity: Severity) -> LogLine {
        LogLine {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            facility: FACILITY_USER,
            severity,
            app: "ops-lldpd".into(),
            message: "neighbor added".into(),
        }
    }

    #[test]
    fn test_rfc5424_format() {
        let line = fixed(Severity::Info);
        assert_eq!(
            line.to_rfc5424("switch1"),
            "<14>1 2026-03-01T12:00:00.000Z switch1 ops-lldpd - - - neighbor added"
        );
    }

    #[test]
    fn test_rfc5424_sanitizes_header_and_message() {
        let mut line = fixed(Severity::Err);
        line.app = "ops lldpd".into();
        line.message = "line one\nline two".into();
        let out = line.to_rfc5424("");
        assert!(out.starts_with("<11>1 "));
        assert!(out.contains(" - opslldpd - - - line one line two"));
    }

    #[test]
    fn test_parse_logger_datagram() {
        let line = LogLine::parse_local("<13>Oct 14 10:00:00 admin[812]: link flap on 1/1/1\n");
        assert_eq!(line.facility, FACILITY_USER);
        assert_eq!(line.severity, Severity::Notice);
        assert_eq!(line.app, "admin");
        assert_eq!(line.message, "link flap on 1/1/1");
    }

    #[test]
    fn test_parse_bare_message() {
        let line = LogLine::parse_local("hello world");
        assert_eq!(line.facility, FACILITY_USER);
        assert_eq!(line.severity, Severity::Notice);
        assert_eq!(line.app, "-");
        assert_eq!(line.message, "hello world");
    }

    #[test]
    fn test_parse_priority_only() {
        let line = LogLine::parse_local("<27>ops-sysd: fan failure");
        assert_eq!(line.facility, FACILITY_DAEMON);
        assert_eq!(line.severity, Severity::Err);
        assert_eq!(line.app, "ops-sysd");
        assert_eq!(line.message, "fan failure");
    }

    #[test]
    fn test_parse_invalid_priority_is_message() {
        let line = LogLine::parse_local("<999>oops");
        assert_eq!(line.message, "<999>oops");
    }

    #[test]
    fn test_event_record_line() {
        let record = EventRecord {
            id: 3,
            timestamp: Utc::now(),
            category: EventCategory::Supportability,
            severity: Severity::Crit,
            event_code: 14001,
            message: "ops-lldpd crashed due to Segmentation fault".into(),
        };
        let line = LogLine::from(&record);
        assert_eq!(line.priority(), 23 * 8 + 2);
        assert!(line.message.starts_with("14001|"));
        assert!(line.message.ends_with("|CRIT|ops-lldpd crashed due to Segmentation fault"));
    }

    #[test]
    fn test_local_hostname_not_empty() {
        assert!(!local_hostname().is_empty());
    }

    proptest! {
        #[test]
        fn prop_pri_decodes_back(pri in 0u8..=191) {
            let (facility, severity) = decode_pri(pri);
            let line = LogLine::new(facility, severity, "x", "y");
            prop_assert_eq!(line.priority(), u16::from(pri));
        }
    }
}
