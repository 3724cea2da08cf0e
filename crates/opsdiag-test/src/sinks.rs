//! Network sinks standing in for remote syslog and TFTP servers.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use opsdiag_crash::tftp::{BLOCK_SIZE, Packet};

use crate::error::{Result, TestError};

/// Receives lines from a [`SyslogSink`] until one matches or `wait` runs out.
async fn next_matching(
    rx: &mut mpsc::UnboundedReceiver<String>,
    wait: Duration,
    pred: impl Fn(&str) -> bool,
) -> Result<String> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some(line)) if pred(&line) => return Ok(line),
            Ok(Some(_)) => {}
            Ok(None) => return Err(TestError::harness("syslog sink closed")),
            Err(_) => return Err(TestError::Timeout(wait)),
        }
    }
}

/// A syslog collector on 127.0.0.1 over UDP or TCP.
#[derive(Debug)]
pub struct SyslogSink {
    addr: SocketAddr,
    rx: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<()>,
}

impl SyslogSink {
    /// Binds a UDP collector; one datagram is one line.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be bound.
    pub async fn udp() -> Result<Self> {
        Self::udp_at("127.0.0.1:0".parse().map_err(|_| TestError::harness("bad address"))?).await
    }

    /// Binds a UDP collector at `addr`.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be bound.
    pub async fn udp_at(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let addr = socket.local_addr()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; 8192];
            while let Ok(len) = socket.recv(&mut buf).await {
                let line = String::from_utf8_lossy(&buf[..len]).trim_end().to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
        Ok(Self { addr, rx, task })
    }

    /// Binds a TCP collector; lines are LF framed.
    ///
    /// # Errors
    /// Returns an error if the listener cannot be bound.
    pub async fn tcp() -> Result<Self> {
        Self::tcp_at("127.0.0.1:0".parse().map_err(|_| TestError::harness("bad address"))?).await
    }

    /// Binds a TCP collector at `addr`.
    ///
    /// # Errors
    /// Returns an error if the listener cannot be bound.
    pub async fn tcp_at(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stream).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        Ok(Self { addr, rx, task })
    }

    /// Bound address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Waits for the next line containing `needle`.
    ///
    /// # Errors
    /// [`TestError::Timeout`] if no such line arrives within `wait`.
    pub async fn expect_line(&mut self, needle: &str, wait: Duration) -> Result<String> {
        next_matching(&mut self.rx, wait, |line| line.contains(needle)).await
    }

    /// Asserts that no line containing `needle` arrives within `wait`.
    ///
    /// # Errors
    /// [`TestError::Assertion`] if one does.
    pub async fn expect_silence(&mut self, needle: &str, wait: Duration) -> Result<()> {
        match next_matching(&mut self.rx, wait, |line| line.contains(needle)).await {
            Ok(line) => Err(TestError::assertion(format!("unexpected line: {line}"))),
            Err(TestError::Timeout(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for SyslogSink {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One file received by a [`TftpSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Name from the write request.
    pub filename: String,
    /// Contents.
    pub data: Vec<u8>,
}

/// A TFTP server accepting write requests in octet mode.
#[derive(Debug)]
pub struct TftpSink {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedFile>>>,
    task: JoinHandle<()>,
}

impl TftpSink {
    /// Binds a server on 127.0.0.1.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be bound.
    pub async fn bind() -> Result<Self> {
        let listener = UdpSocket::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let received: Arc<Mutex<Vec<ReceivedFile>>> = Arc::default();
        let store = Arc::clone(&received);
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            while let Ok((len, client)) = listener.recv_from(&mut buf).await {
                let Some(Packet::Wrq { filename, .. }) = Packet::decode(&buf[..len]) else {
                    continue;
                };
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    if let Ok(data) = receive(client).await {
                        store.lock().push(ReceivedFile { filename, data });
                    }
                });
            }
        });
        Ok(Self {
            addr,
            received,
            task,
        })
    }

    /// Bound address.
    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Files received so far.
    #[must_use]
    pub fn received(&self) -> Vec<ReceivedFile> {
        self.received.lock().clone()
    }

    /// Waits until a file named `filename` has been fully received.
    ///
    /// # Errors
    /// [`TestError::Timeout`] if it does not arrive within `wait`.
    pub async fn wait_for(&self, filename: &str, wait: Duration) -> Result<ReceivedFile> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(file) = self
                .received
                .lock()
                .iter()
                .find(|f| f.filename == filename)
                .cloned()
            {
                return Ok(file);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TestError::Timeout(wait));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for TftpSink {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Serves one transfer from a fresh transfer id.
async fn receive(client: SocketAddr) -> std::io::Result<Vec<u8>> {
    let transfer = UdpSocket::bind("127.0.0.1:0").await?;
    transfer.send_to(&Packet::Ack { block: 0 }.encode(), client).await?;

    let mut buf = [0u8; 4 + BLOCK_SIZE];
    let mut data = Vec::new();
    let mut expected: u16 = 1;
    loop {
        let (len, from) = tokio::time::timeout(Duration::from_secs(5), transfer.recv_from(&mut buf))
            .await
            .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
        if from != client {
            continue;
        }
        let Some(Packet::Data { block, payload }) = Packet::decode(&buf[..len]) else {
            continue;
        };
        if block == expected {
            data.extend_from_slice(&payload);
            expected = expected.wrapping_add(1);
        }
        transfer.send_to(&Packet::Ack { block }.encode(), client).await?;
        if block == expected.wrapping_sub(1) && payload.len() < BLOCK_SIZE {
            return Ok(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsdiag_crash::TftpClient;

    #[tokio::test]
    async fn test_udp_sink_receives() {
        let mut sink = SyslogSink::udp().await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(b"<14>1 hello\n", sink.addr()).await.unwrap();
        let line = sink.expect_line("hello", Duration::from_secs(2)).await.unwrap();
        assert_eq!(line, "<14>1 hello");
    }

    #[tokio::test]
    async fn test_expect_silence() {
        let mut sink = SyslogSink::tcp().await.unwrap();
        sink.expect_silence("anything", Duration::from_millis(100))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_tftp_sink_receives_upload() {
        let sink = TftpSink::bind().await.unwrap();
        let data: Vec<u8> = (0..BLOCK_SIZE * 3).map(|i| (i % 7) as u8).collect();
        TftpClient::new(Duration::from_millis(500), 3)
            .put(sink.addr(), "core.test", &data)
            .await
            .unwrap();
        let file = sink.wait_for("core.test", Duration::from_secs(2)).await.unwrap();
        assert_eq!(file.data, data);
    }
}
