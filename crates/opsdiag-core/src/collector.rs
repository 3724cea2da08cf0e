//! Daemon collector: bounded diagnostic retrieval from running daemons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::channel::{ControlClient, DIAG_DUMP_METHOD};
use crate::error::CollectorError;
use crate::registry::DaemonRef;

/// Capture kinds a daemon can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    /// Basic diagnostic dump.
    Basic,
}

impl CaptureKind {
    /// Returns the CLI and wire token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
        }
    }
}

/// Outcome carried by a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PayloadStatus {
    /// The daemon produced its diagnostic data.
    Pass,
    /// The daemon answered but could not produce data; the body explains why.
    Fail,
}

/// Diagnostic data returned by one daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticPayload {
    /// Feature captured.
    pub feature: String,
    /// Daemon that answered.
    pub daemon: String,
    /// Capture time.
    pub captured_at: DateTime<Utc>,
    /// Raw diagnostic text.
    pub body: Vec<u8>,
    /// Outcome.
    pub status: PayloadStatus,
}

impl DiagnosticPayload {
    /// Returns true for a PASS payload.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.status == PayloadStatus::Pass
    }

    /// Returns the body as text.
    #[must_use]
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Retrieves diagnostic payloads over the control channel.
#[derive(Debug, Clone)]
pub struct DaemonCollector {
    client: Arc<ControlClient>,
}

impl DaemonCollector {
    /// Creates a collector on top of a shared control client.
    #[must_use]
    pub const fn new(client: Arc<ControlClient>) -> Self {
        Self { client }
    }

    /// Returns the underlying control client.
    #[must_use]
    pub fn client(&self) -> &Arc<ControlClient> {
        &self.client
    }

    /// Collects one payload from `daemon` for `feature`.
    ///
    /// A handler-level failure is returned as a FAIL payload, not an error.
    ///
    /// # Errors
    /// [`CollectorError::Unreachable`], [`CollectorError::Timeout`] or, for a
    /// protocol-level rejection, [`CollectorError::DaemonError`].
    pub async fn collect(
        &self,
        daemon: &DaemonRef,
        feature: &str,
        kind: CaptureKind,
        timeout: Duration,
    ) -> Result<DiagnosticPayload, CollectorError> {
        let method = match kind {
            CaptureKind::Basic => DIAG_DUMP_METHOD,
        };
        let params = vec![kind.as_str().to_string(), feature.to_string()];

        tracing::debug!(daemon = %daemon.identifier, feature = %feature, "collecting diagnostics");
        let reply = self
            .client
            .call(&daemon.identifier, method, params, timeout)
            .await?;

        let (body, status) = match (reply.result, reply.error) {
            (_, Some(error)) if error.is_protocol() => {
                return Err(CollectorError::DaemonError {
                    daemon: daemon.identifier.clone(),
                    code: error.code,
                    message: error.message,
                });
            }
            (_, Some(error)) => (error.message.into_bytes(), PayloadStatus::Fail),
            (result, None) => (result.unwrap_or_default().into_bytes(), PayloadStatus::Pass),
        };

        Ok(DiagnosticPayload {
            feature: feature.to_string(),
            daemon: daemon.identifier.clone(),
            captured_at: Utc::now(),
            body,
            status,
        })
    }
}
