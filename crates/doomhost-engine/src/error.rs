//! Error types for the engine clients.

use std::time::Duration;

use doomhost_protocol::BufferError;
use doomhost_transport::TransportError;

/// A server query failed.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The server did not answer in time.
    #[error("server query timed out after {0:?}")]
    Timeout(Duration),

    /// The reply ended in the middle of a field.
    #[error("truncated query reply: {0}")]
    Truncated(#[from] BufferError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// An RCON exchange failed.
#[derive(Debug, thiserror::Error)]
pub enum RconError {
    #[error("rcon reply timed out after {0:?}")]
    Timeout(Duration),

    /// The server refuses RCON from this address.
    #[error("banned by the server")]
    Banned,

    #[error("invalid rcon password")]
    InvalidPassword,

    /// The server speaks a different RCON revision.
    #[error("server rejected the rcon protocol version")]
    OldProtocol,

    /// A reply carried an opcode that makes no sense at this stage.
    #[error("unexpected reply code {code} while waiting for {stage}")]
    UnexpectedReply { stage: &'static str, code: u8 },

    /// A reply datagram decoded to nothing.
    #[error("empty reply while waiting for {0}")]
    EmptyReply(&'static str),

    /// The salt reply was shorter than 32 bytes.
    #[error("salt reply carried {0} bytes, expected 32")]
    MalformedSalt(usize),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
