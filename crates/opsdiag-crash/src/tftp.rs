//! TFTP write client (RFC 1350, octet mode).
//!
//! Used to copy a compressed core off the switch. The server answers the
//! write request from a fresh port (its transfer id); every later packet is
//! exchanged with that port only.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

use crate::error::{CrashError, Result};

/// Well-known TFTP port.
pub const TFTP_PORT: u16 = 69;

/// Payload bytes per DATA block.
pub const BLOCK_SIZE: usize = 512;

const OP_WRQ: u16 = 2;
const OP_DATA: u16 = 3;
const OP_ACK: u16 = 4;
const OP_ERROR: u16 = 5;

/// A decoded TFTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Read request.
    Rrq {
        /// File name.
        filename: String,
        /// Transfer mode.
        mode: String,
    },
    /// Write request.
    Wrq {
        /// File name.
        filename: String,
        /// Transfer mode.
        mode: String,
    },
    /// Data block.
    Data {
        /// Block number.
        block: u16,
        /// Payload, at most [`BLOCK_SIZE`] bytes.
        payload: Vec<u8>,
    },
    /// Acknowledgment.
    Ack {
        /// Block number acknowledged.
        block: u16,
    },
    /// Error.
    Error {
        /// Error code.
        code: u16,
        /// Error message.
        message: String,
    },
}

impl Packet {
    /// Encodes the packet.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + BLOCK_SIZE);
        match self {
            Self::Rrq { filename, mode } | Self::Wrq { filename, mode } => {
                let op = if matches!(self, Self::Rrq { .. }) { 1 } else { OP_WRQ };
                buf.extend_from_slice(&op.to_be_bytes());
                buf.extend_from_slice(filename.as_bytes());
                buf.push(0);
                buf.extend_from_slice(mode.as_bytes());
                buf.push(0);
            }
            Self::Data { block, payload } => {
                buf.extend_from_slice(&OP_DATA.to_be_bytes());
                buf.extend_from_slice(&block.to_be_bytes());
                buf.extend_from_slice(payload);
            }
            Self::Ack { block } => {
                buf.extend_from_slice(&OP_ACK.to_be_bytes());
                buf.extend_from_slice(&block.to_be_bytes());
            }
            Self::Error { code, message } => {
                buf.extend_from_slice(&OP_ERROR.to_be_bytes());
                buf.extend_from_slice(&code.to_be_bytes());
                buf.extend_from_slice(message.as_bytes());
                buf.push(0);
            }
        }
        buf
    }

    /// Decodes a packet, or `None` if it is malformed.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let op = u16::from_be_bytes([*buf.first()?, *buf.get(1)?]);
        let rest = &buf[2..];
        let word = |b: &[u8]| -> Option<u16> { Some(u16::from_be_bytes([*b.first()?, *b.get(1)?])) };
        match op {
            1 | OP_WRQ => {
                let mut parts = rest.split(|b| *b == 0);
                let filename = String::from_utf8(parts.next()?.to_vec()).ok()?;
                let mode = String::from_utf8(parts.next()?.to_vec()).ok()?;
                if filename.is_empty() {
                    return None;
                }
                Some(if op == 1 {
                    Self::Rrq { filename, mode }
                } else {
                    Self::Wrq { filename, mode }
                })
            }
            OP_DATA => Some(Self::Data {
                block: word(rest)?,
                payload: rest.get(2..)?.to_vec(),
            }),
            OP_ACK => Some(Self::Ack { block: word(rest)? }),
            OP_ERROR => {
                let code = word(rest)?;
                let text = rest.get(2..)?;
                let end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
                Some(Self::Error {
                    code,
                    message: String::from_utf8_lossy(&text[..end]).into_owned(),
                })
            }
            _ => None,
        }
    }
}

/// TFTP upload client.
#[derive(Debug, Clone, Copy)]
pub struct TftpClient {
    timeout: Duration,
    retries: u32,
}

impl Default for TftpClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 5)
    }
}

impl TftpClient {
    /// Creates a client with a per-packet deadline and retransmit bound.
    #[must_use]
    pub const fn new(timeout: Duration, retries: u32) -> Self {
        Self { timeout, retries }
    }

    /// Uploads `data` as `filename` to `server`.
    ///
    /// Returns the number of payload bytes sent.
    ///
    /// # Errors
    /// [`CrashError::Transfer`] for a server error, an unresponsive server
    /// or a socket failure.
    pub async fn put(&self, server: SocketAddr, filename: &str, data: &[u8]) -> Result<usize> {
        let bind: SocketAddr = if server.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| CrashError::transfer(format!("cannot open TFTP socket: {e}")))?;

        let wrq = Packet::Wrq {
            filename: filename.to_string(),
            mode: "octet".to_string(),
        }
        .encode();
        let peer = self.exchange(&socket, server, None, &wrq, 0).await?;

        let mut block: u16 = 0;
        let mut offset = 0usize;
        loop {
            block = block.wrapping_add(1);
            let end = (offset + BLOCK_SIZE).min(data.len());
            let data_packet = Packet::Data {
                block,
                payload: data[offset..end].to_vec(),
            }
            .encode();
            self.exchange(&socket, peer, Some(peer), &data_packet, block)
                .await?;

            let sent = end - offset;
            offset = end;
            if sent < BLOCK_SIZE {
                break;
            }
        }

        tracing::info!(server = %server, file = %filename, bytes = data.len(), "TFTP upload complete");
        Ok(data.len())
    }

    /// Sends `packet` to `to` until `ACK(block)` arrives.
    ///
    /// Returns the address that acknowledged. With `tid` set, packets from
    /// any other address are ignored.
    async fn exchange(
        &self,
        socket: &UdpSocket,
        to: SocketAddr,
        tid: Option<SocketAddr>,
        packet: &[u8],
        block: u16,
    ) -> Result<SocketAddr> {
        let mut buf = [0u8; 4 + BLOCK_SIZE];
        for attempt in 0..=self.retries {
            socket
                .send_to(packet, to)
                .await
                .map_err(|e| CrashError::transfer(format!("TFTP send to {to} failed: {e}")))?;

            let deadline = tokio::time::Instant::now() + self.timeout;
            loop {
                let recv = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
                let (len, from) = match recv {
                    Err(_) => break,
                    Ok(Err(e)) => {
                        return Err(CrashError::transfer(format!("TFTP receive failed: {e}")));
                    }
                    Ok(Ok(got)) => got,
                };
                if tid.is_some_and(|t| t != from) {
                    let _ = socket
                        .send_to(
                            &Packet::Error {
                                code: 5,
                                message: "Unknown transfer ID".into(),
                            }
                            .encode(),
                            from,
                        )
                        .await;
                    continue;
                }
                match Packet::decode(&buf[..len]) {
                    Some(Packet::Ack { block: acked }) if acked == block => return Ok(from),
                    Some(Packet::Error { code, message }) => {
                        return Err(CrashError::transfer(format!(
                            "TFTP server error {code}: {message}"
                        )));
                    }
                    _ => {}
                }
            }
            tracing::debug!(to = %to, block, attempt, "TFTP retransmit");
        }
        Err(CrashError::transfer(format!(
            "TFTP server {to} did not acknowledge block {block}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrq_encoding() {
        let wrq = Packet::Wrq {
            filename: "core.gz".into(),
            mode: "octet".into(),
        };
        let bytes = wrq.encode();
        assert_eq!(&bytes[..2], &[0, 2]);
        assert_eq!(&bytes[2..], b"core.gz\0octet\0");
        assert_eq!(Packet::decode(&bytes), Some(wrq));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(Packet::decode(&[]), None);
        assert_eq!(Packet::decode(&[0, 9, 0, 0]), None);
        assert_eq!(Packet::decode(&[0, 4, 1]), None);
    }

    #[test]
    fn test_error_decoding() {
        let err = Packet::decode(b"\x00\x05\x00\x02Access violation\x00").unwrap();
        assert_eq!(
            err,
            Packet::Error {
                code: 2,
                message: "Access violation".into()
            }
        );
    }

    /// Accepts one upload and returns its name and contents.
    async fn serve_one(listener: UdpSocket) -> (String, Vec<u8>) {
        let mut buf = [0u8; 1024];
        let (len, client) = listener.recv_from(&mut buf).await.unwrap();
        let Some(Packet::Wrq { filename, .. }) = Packet::decode(&buf[..len]) else {
            panic!("expected WRQ");
        };

        let transfer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        transfer
            .send_to(&Packet::Ack { block: 0 }.encode(), client)
            .await
            .unwrap();

        let mut received = Vec::new();
        loop {
            let (len, _) = transfer.recv_from(&mut buf).await.unwrap();
            let Some(Packet::Data { block, payload }) = Packet::decode(&buf[..len]) else {
                panic!("expected DATA");
            };
            received.extend_from_slice(&payload);
            transfer
                .send_to(&Packet::Ack { block }.encode(), client)
                .await
                .unwrap();
            if payload.len() < BLOCK_SIZE {
                break;
            }
        }
        (filename, received)
    }

    #[tokio::test]
    async fn test_put_multi_block() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_one(listener));

        let data: Vec<u8> = (0..BLOCK_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        let sent = TftpClient::new(Duration::from_millis(500), 3)
            .put(addr, "core.ops-lldpd.1.gz", &data)
            .await
            .unwrap();
        assert_eq!(sent, data.len());

        let (name, received) = server.await.unwrap();
        assert_eq!(name, "core.ops-lldpd.1.gz");
        assert_eq!(received, data);
    }

    #[tokio::test]
    async fn test_put_exact_block_multiple_sends_empty_tail() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_one(listener));

        let data = vec![7u8; BLOCK_SIZE];
        TftpClient::new(Duration::from_millis(500), 3)
            .put(addr, "exact", &data)
            .await
            .unwrap();
        let (_, received) = server.await.unwrap();
        assert_eq!(received.len(), BLOCK_SIZE);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (_, client) = listener.recv_from(&mut buf).await.unwrap();
            let err = Packet::Error {
                code: 2,
                message: "Access violation".into(),
            };
            listener.send_to(&err.encode(), client).await.unwrap();
        });

        let err = TftpClient::new(Duration::from_millis(500), 1)
            .put(addr, "x", b"data")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "TFTP server error 2: Access violation");
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let err = TftpClient::new(Duration::from_millis(50), 2)
            .put(addr, "x", b"data")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not acknowledge block 0"));
        drop(listener);
    }
}
