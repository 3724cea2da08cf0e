//! `tracing` layer shipping the process's own events to the forwarder.

use std::fmt::{self, Write as _};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use opsdiag_core::Severity;

use crate::forwarder::Forwarder;
use crate::syslog::{FACILITY_DAEMON, LogLine};

/// Events from this crate are never forwarded, so a failing target cannot
/// feed its own failure reports back into the queue.
const SELF_TARGET: &str = "opsdiag_forward";

/// Forwards tracing events at or above a severity threshold.
#[derive(Debug, Clone)]
pub struct ForwardLayer {
    forwarder: Arc<Forwarder>,
    threshold: Severity,
    app: String,
}

impl ForwardLayer {
    /// Creates a layer forwarding events at `threshold` or more severe.
    #[must_use]
    pub fn new(forwarder: Arc<Forwarder>, threshold: Severity) -> Self {
        Self {
            forwarder,
            threshold,
            app: "opsdiagd".to_string(),
        }
    }

    /// Sets the APP-NAME of forwarded lines.
    #[must_use]
    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = app.into();
        self
    }
}

/// Maps a tracing level onto syslog severity.
#[must_use]
pub fn severity_of(level: &Level) -> Severity {
    match *level {
        Level::ERROR => Severity::Err,
        Level::WARN => Severity::Warn,
        Level::INFO => Severity::Info,
        _ => Severity::Debug,
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S: Subscriber> Layer<S> for ForwardLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(SELF_TARGET) {
            return;
        }
        let severity = severity_of(meta.level());
        if !severity.is_at_least(self.threshold) {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let message = format!("{}{}", visitor.message, visitor.fields);
        self.forwarder
            .forward(&LogLine::new(FACILITY_DAEMON, severity, &self.app, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{RemoteLogTarget, Transport};
    use opsdiag_core::config::ForwarderConfig;
    use std::time::Duration;
    use tokio::net::UdpSocket;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(severity_of(&Level::ERROR), Severity::Err);
        assert_eq!(severity_of(&Level::WARN), Severity::Warn);
        assert_eq!(severity_of(&Level::INFO), Severity::Info);
        assert_eq!(severity_of(&Level::TRACE), Severity::Debug);
    }

    #[tokio::test]
    async fn test_layer_forwards_above_threshold() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = sink.local_addr().unwrap().port();
        let fwd = Arc::new(Forwarder::new(&ForwarderConfig {
            hostname: Some("switch1".into()),
            ..ForwarderConfig::default()
        }));
        fwd.add_target(RemoteLogTarget::new("127.0.0.1", Transport::Udp, port).unwrap())
            .unwrap();

        let subscriber = tracing_subscriber::registry()
            .with(ForwardLayer::new(Arc::clone(&fwd), Severity::Warn).with_app("unit"));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "opsdiag::shell", "below threshold");
            tracing::warn!(target: "opsdiag::shell", daemon = "ops-lldpd", "daemon slow");
            tracing::error!(target: "opsdiag_forward::forwarder", "own event");
        });

        let mut buf = [0u8; 2048];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), sink.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let got = std::str::from_utf8(&buf[..len]).unwrap();
        assert!(got.starts_with("<28>1 "), "{got}");
        assert!(got.ends_with(" switch1 unit - - - daemon slow daemon=ops-lldpd"), "{got}");

        let more = tokio::time::timeout(Duration::from_millis(200), sink.recv_from(&mut buf)).await;
        assert!(more.is_err(), "only one line should be forwarded");
    }
}
