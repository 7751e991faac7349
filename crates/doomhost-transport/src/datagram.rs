//! Huffman-wrapped UDP exchange with an engine instance.
//!
//! Every launcher query and RCON message is a single datagram encoded with
//! the engine's Huffman table. [`HuffmanSocket`] hides the encoding and the
//! receive timeout; callers work with plain payload bytes.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use doomhost_protocol::huffman;
use tokio::net::UdpSocket;

use crate::TransportError;

/// How long to wait for each reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest datagram we expect from the engine.
pub const RECV_BUFFER: usize = 2048;

/// A UDP socket connected to one engine address.
#[derive(Debug)]
pub struct HuffmanSocket {
    socket: UdpSocket,
    timeout: Duration,
}

impl HuffmanSocket {
    /// Binds an ephemeral local port and connects it to `peer`, so only
    /// datagrams from `peer` are received.
    pub async fn connect(peer: SocketAddr) -> Result<Self, TransportError> {
        let local: SocketAddr = match peer {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(TransportError::AcceptFailed)?;
        socket
            .connect(peer)
            .await
            .map_err(TransportError::AcceptFailed)?;
        Ok(Self {
            socket,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Overrides the per-receive timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Encodes and sends one payload.
    pub async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let encoded = huffman::encode(payload);
        self.socket
            .send(&encoded)
            .await
            .map_err(TransportError::SendFailed)?;
        Ok(())
    }

    /// Waits for one datagram and decodes it.
    ///
    /// # Errors
    /// [`TransportError::Timeout`] if nothing arrives in time,
    /// [`TransportError::Huffman`] if the datagram does not decode.
    pub async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut buf = vec![0u8; RECV_BUFFER];
        let n = tokio::time::timeout(self.timeout, self.socket.recv(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
            .map_err(TransportError::ReceiveFailed)?;
        Ok(huffman::decode(&buf[..n])?)
    }

    /// Sends `payload` and waits for the reply.
    pub async fn exchange(&self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.send(payload).await?;
        self.recv().await
    }
}
