//! Remote log forwarder.
//!
//! Every target owns one task and one bounded queue. Producers format a
//! line once and `try_send` it to each queue, so a slow or dead target
//! drops its own lines and never delays the producer or another target.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use opsdiag_core::config::ForwarderConfig;

use crate::backoff::Backoff;
use crate::error::{ForwardError, Result};
use crate::syslog::{LogLine, local_hostname};
use crate::target::{RemoteLogTarget, Transport};

/// Per-target delivery counters.
#[derive(Debug, Default)]
pub struct TargetStats {
    sent: AtomicU64,
    dropped: AtomicU64,
    reconnects: AtomicU64,
}

impl TargetStats {
    /// Copies the counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }

    fn sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn reconnected(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`TargetStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Lines written to the wire.
    pub sent: u64,
    /// Lines lost to a full queue or a failed send.
    pub dropped: u64,
    /// Stream connections established.
    pub reconnects: u64,
}

#[derive(Debug)]
struct Session {
    tx: mpsc::Sender<Arc<str>>,
    stats: Arc<TargetStats>,
    task: JoinHandle<()>,
}

/// Fans local log lines out to every configured target.
#[derive(Debug)]
pub struct Forwarder {
    hostname: String,
    queue_depth: usize,
    backoff: Backoff,
    sessions: RwLock<BTreeMap<RemoteLogTarget, Session>>,
}

impl Forwarder {
    /// Creates a forwarder with no targets.
    #[must_use]
    pub fn new(config: &ForwarderConfig) -> Self {
        Self {
            hostname: config.hostname.clone().unwrap_or_else(local_hostname),
            queue_depth: config.queue_depth.max(1),
            backoff: Backoff::from_config(config),
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Host name written into every line.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Starts forwarding to `target`. Adding a present target is a no-op.
    ///
    /// # Errors
    /// [`ForwardError::NoRuntime`] when called outside a tokio runtime.
    pub fn add_target(&self, target: RemoteLogTarget) -> Result<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&target) {
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| ForwardError::NoRuntime(target.to_string()))?;

        let (tx, rx) = mpsc::channel(self.queue_depth);
        let stats = Arc::new(TargetStats::default());
        let task = match target.transport {
            Transport::Udp => handle.spawn(run_udp(target.clone(), rx, Arc::clone(&stats))),
            Transport::Tcp => handle.spawn(run_tcp(
                target.clone(),
                rx,
                Arc::clone(&stats),
                self.backoff,
            )),
        };
        tracing::info!(target_addr = %target, "remote log target added");
        sessions.insert(target, Session { tx, stats, task });
        Ok(())
    }

    /// Stops forwarding to `target`. Returns false if it was not present.
    pub fn remove_target(&self, target: &RemoteLogTarget) -> bool {
        let Some(session) = self.sessions.write().remove(target) else {
            return false;
        };
        session.task.abort();
        tracing::info!(target_addr = %target, "remote log target removed");
        true
    }

    /// Configured targets in sorted order.
    #[must_use]
    pub fn targets(&self) -> Vec<RemoteLogTarget> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Delivery counters for `target`.
    #[must_use]
    pub fn stats(&self, target: &RemoteLogTarget) -> Option<StatsSnapshot> {
        self.sessions.read().get(target).map(|s| s.stats.snapshot())
    }

    /// Queues `line` for every target without waiting.
    pub fn forward(&self, line: &LogLine) {
        let sessions = self.sessions.read();
        if sessions.is_empty() {
            return;
        }
        let text: Arc<str> = Arc::from(line.to_rfc5424(&self.hostname));
        for session in sessions.values() {
            if session.tx.try_send(Arc::clone(&text)).is_err() {
                session.stats.dropped();
            }
        }
    }

    /// Stops every target.
    pub fn shutdown(&self) {
        let mut sessions = self.sessions.write();
        for (_, session) in std::mem::take(&mut *sessions) {
            session.task.abort();
        }
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn connect_udp(target: &RemoteLogTarget) -> std::io::Result<UdpSocket> {
    let addr = tokio::net::lookup_host(target.socket_spec())
        .await?
        .next()
        .ok_or_else(|| std::io::Error::other(format!("cannot resolve {}", target.address)))?;
    let local = if addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await?;
    Ok(socket)
}

async fn run_udp(
    target: RemoteLogTarget,
    mut rx: mpsc::Receiver<Arc<str>>,
    stats: Arc<TargetStats>,
) {
    let mut socket: Option<UdpSocket> = None;
    while let Some(line) = rx.recv().await {
        if socket.is_none() {
            match connect_udp(&target).await {
                Ok(s) => socket = Some(s),
                Err(e) => {
                    tracing::debug!(target_addr = %target, error = %e, "udp target unavailable");
                    stats.dropped();
                    continue;
                }
            }
        }
        let Some(s) = &socket else { continue };
        match s.send(line.as_bytes()).await {
            Ok(_) => stats.sent(),
            Err(e) => {
                // A connected UDP socket reports ICMP errors on the next send.
                tracing::debug!(target_addr = %target, error = %e, "udp send failed");
                stats.dropped();
                socket = None;
            }
        }
    }
}

async fn connect_tcp(
    target: &RemoteLogTarget,
    stats: &TargetStats,
    backoff: Backoff,
) -> TcpStream {
    let mut attempt = 0u32;
    loop {
        match TcpStream::connect(target.socket_spec()).await {
            Ok(stream) => {
                stats.reconnected();
                tracing::debug!(target_addr = %target, attempt, "tcp target connected");
                return stream;
            }
            Err(e) => {
                let delay = backoff.delay_for(attempt);
                tracing::debug!(target_addr = %target, error = %e, retry_in = ?delay, "tcp connect failed");
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}

async fn run_tcp(
    target: RemoteLogTarget,
    mut rx: mpsc::Receiver<Arc<str>>,
    stats: Arc<TargetStats>,
    backoff: Backoff,
) {
    let mut stream: Option<TcpStream> = None;
    while let Some(line) = rx.recv().await {
        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');

        let mut delivered = false;
        for _ in 0..2 {
            if stream.is_none() {
                stream = Some(connect_tcp(&target, &stats, backoff).await);
            }
            let Some(conn) = stream.as_mut() else { break };
            match conn.write_all(&framed).await {
                Ok(()) => {
                    delivered = true;
                    break;
                }
                Err(e) => {
                    tracing::debug!(target_addr = %target, error = %e, "tcp send failed");
                    stream = None;
                }
            }
        }
        if delivered {
            stats.sent();
        } else {
            stats.dropped();
        }
    }
}
