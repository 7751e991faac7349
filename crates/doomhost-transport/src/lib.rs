//! Network plumbing for doomhost.
//!
//! - [`ControlListener`] / [`ControlConnection`]: the TCP control channel
//!   and its length-prefixed request [`Frame`].
//! - [`HuffmanSocket`]: a UDP socket that speaks the engine's Huffman
//!   wrapping, used by the query and RCON clients.

mod control;
mod datagram;
mod error;
pub mod frame;

pub use control::{ControlConnection, ControlListener};
pub use datagram::{DEFAULT_TIMEOUT, HuffmanSocket, RECV_BUFFER};
pub use error::TransportError;
pub use frame::{DEFAULT_MAX_FRAME, Frame, encode_frame, read_frame};

use std::fmt;

/// Opaque identifier for a control connection, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctl-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "ctl-7");
        assert_eq!(ConnectionId::new(7).into_inner(), 7);
    }
}
