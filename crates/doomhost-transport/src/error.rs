use std::time::Duration;

use doomhost_protocol::{HuffmanError, ProtocolError};

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the connection before a complete frame arrived.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding a socket or accepting a connection failed.
    #[error("bind/accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// No datagram arrived within the receive timeout.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// A control frame declared a body longer than the configured limit.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// A datagram was not valid Huffman data.
    #[error(transparent)]
    Huffman(#[from] HuffmanError),

    /// A reply could not be serialized.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
