//! Local log sources feeding the forwarder.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::UnixDatagram;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use opsdiag_core::EventLog;

use crate::error::{ForwardError, Result};
use crate::forwarder::Forwarder;
use crate::syslog::LogLine;

/// Largest datagram accepted on the local socket.
const MAX_DATAGRAM: usize = 8192;

/// Unix datagram socket accepting `logger`-style lines.
#[derive(Debug)]
pub struct SyslogIngress {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl SyslogIngress {
    /// Binds `path` and forwards every datagram received on it.
    ///
    /// A stale socket file at `path` is replaced.
    ///
    /// # Errors
    /// [`ForwardError::Ingress`] if the socket cannot be bound.
    pub fn bind(path: impl AsRef<Path>, forwarder: Arc<Forwarder>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ForwardError::ingress(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed stale syslog socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ForwardError::ingress(format!(
                    "cannot replace {}: {e}",
                    path.display()
                )));
            }
        }
        let socket = UnixDatagram::bind(&path)
            .map_err(|e| ForwardError::ingress(format!("cannot bind {}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), "local syslog ingress listening");

        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match socket.recv(&mut buf).await {
                    Ok(0) => {}
                    Ok(len) => {
                        let text = String::from_utf8_lossy(&buf[..len]);
                        forwarder.forward(&LogLine::parse_local(&text));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "syslog ingress receive failed");
                        break;
                    }
                }
            }
        });
        Ok(Self { path, task })
    }

    /// Socket path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SyslogIngress {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Forwards every record appended to `events` from now on.
pub fn forward_events(events: &EventLog, forwarder: Arc<Forwarder>) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(record) => forwarder.forward(&LogLine::from(&record)),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event forwarding lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
