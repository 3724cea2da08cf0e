//! Core dump copy-out.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use opsdiag_core::SupportError;

use crate::cores::CoreDumpRegistry;
use crate::error::{CrashError, Result};
use crate::tftp::{TFTP_PORT, TftpClient};

/// Copy-out transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyTransport {
    /// Trivial File Transfer Protocol.
    Tftp,
}

impl CopyTransport {
    /// CLI token.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tftp => "tftp",
        }
    }

    const fn default_port(self) -> u16 {
        match self {
            Self::Tftp => TFTP_PORT,
        }
    }
}

impl FromStr for CopyTransport {
    type Err = SupportError;

    fn from_str(s: &str) -> std::result::Result<Self, SupportError> {
        match s {
            "tftp" => Ok(Self::Tftp),
            other => Err(SupportError::syntax(other)),
        }
    }
}

/// Status of a copy-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    /// The file reached the server.
    Success,
    /// The copy did not complete.
    Failure,
}

/// Result of a copy-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyOutcome {
    /// Status.
    pub status: CopyStatus,
    /// Why the copy failed; empty on success.
    pub reason: Option<String>,
    /// Remote file name used.
    pub remote_name: String,
    /// Bytes transferred.
    pub bytes: usize,
}

impl CopyOutcome {
    fn failure(remote_name: String, reason: impl Into<String>) -> Self {
        Self {
            status: CopyStatus::Failure,
            reason: Some(reason.into()),
            remote_name,
            bytes: 0,
        }
    }

    /// Returns true on success.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == CopyStatus::Success
    }
}

impl fmt::Display for CopyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.status, &self.reason) {
            (CopyStatus::Success, _) => write!(
                f,
                "status=success file={} bytes={}",
                self.remote_name, self.bytes
            ),
            (CopyStatus::Failure, reason) => write!(
                f,
                "status=failure reason={}",
                reason.as_deref().unwrap_or("unknown")
            ),
        }
    }
}

/// Appends `port` unless `server` already names one.
fn with_default_port(server: &str, port: u16) -> String {
    if server.parse::<SocketAddr>().is_ok() {
        return server.to_string();
    }
    if server.parse::<std::net::Ipv6Addr>().is_ok() {
        return format!("[{server}]:{port}");
    }
    match server.rsplit_once(':') {
        Some((_, p)) if p.parse::<u16>().is_ok() => server.to_string(),
        _ => format!("{server}:{port}"),
    }
}

async fn resolve(server: &str, transport: CopyTransport) -> Result<SocketAddr> {
    let target = with_default_port(server, transport.default_port());
    tokio::net::lookup_host(&target)
        .await
        .map_err(|e| CrashError::transfer(format!("cannot resolve server {server}: {e}")))?
        .next()
        .ok_or_else(|| CrashError::transfer(format!("cannot resolve server {server}")))
}

/// Copies one core dump to a remote server.
///
/// Never fails: every problem, including an unknown instance, is reported
/// as [`CopyStatus::Failure`] with a reason.
pub async fn copy_core_dump(
    registry: &CoreDumpRegistry,
    client: TftpClient,
    daemon: &str,
    instance_id: u64,
    transport: CopyTransport,
    server: &str,
    filename: Option<&str>,
) -> CopyOutcome {
    let record = match registry.find(daemon, instance_id) {
        Ok(record) => record,
        Err(e) => return CopyOutcome::failure(filename.unwrap_or_default().to_string(), e.to_string()),
    };
    let remote_name = filename.map_or_else(
        || {
            record
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        },
        str::to_string,
    );

    let result: Result<usize> = async {
        let data = tokio::fs::read(&record.path).await?;
        let addr = resolve(server, transport).await?;
        match transport {
            CopyTransport::Tftp => client.put(addr, &remote_name, &data).await,
        }
    }
    .await;

    match result {
        Ok(bytes) => {
            tracing::info!(daemon = %daemon, instance_id, server = %server, "core dump copied");
            CopyOutcome {
                status: CopyStatus::Success,
                reason: None,
                remote_name,
                bytes,
            }
        }
        Err(e) => {
            tracing::warn!(daemon = %daemon, instance_id, server = %server, error = %e, "core dump copy failed");
            CopyOutcome::failure(remote_name, e.to_string())
        }
    }
}
