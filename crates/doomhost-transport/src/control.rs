//! TCP control channel: listener and per-connection I/O.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use doomhost_protocol::{Codec, ControlReply};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::frame::{Frame, read_frame};
use crate::{ConnectionId, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Listens for control connections.
pub struct ControlListener {
    listener: TcpListener,
}

impl ControlListener {
    /// Binds the control listener to `addr`.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "control listener bound");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits for the next control connection.
    pub async fn accept(&self) -> Result<ControlConnection, TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %peer, "accepted control connection");

        Ok(ControlConnection { id, peer, stream })
    }
}

/// One accepted control connection.
pub struct ControlConnection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
}

impl ControlConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Reads the request frame.
    pub async fn read_frame(&mut self, max_len: usize) -> Result<Frame, TransportError> {
        read_frame(&mut self.stream, max_len).await
    }

    /// Reads whatever raw bytes arrive next. `Ok(0)` means end of stream.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        self.stream
            .read(buf)
            .await
            .map_err(TransportError::ReceiveFailed)
    }

    /// Writes the reply body. Replies are not length-prefixed.
    pub async fn send_reply<C: Codec>(
        &mut self,
        codec: &C,
        reply: &ControlReply,
    ) -> Result<(), TransportError> {
        let bytes = codec.encode(reply)?;
        self.stream
            .write_all(&bytes)
            .await
            .map_err(TransportError::SendFailed)?;
        self.stream.flush().await.map_err(TransportError::SendFailed)
    }

    /// Shuts down the write half so the client sees end of stream.
    pub async fn close(mut self) -> Result<(), TransportError> {
        self.stream
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }
}
