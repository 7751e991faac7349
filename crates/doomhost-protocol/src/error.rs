//! Error types for the protocol layer.
//!
//! Each codec gets its own enum so callers can tell a short datagram from a
//! corrupt Huffman stream from a malformed control request.

/// A typed read ran past the end of a [`ByteBuffer`](crate::ByteBuffer).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// Fewer bytes remain than the read needs.
    #[error("buffer underflow: needed {needed} bytes, {remaining} remaining")]
    Underflow { needed: usize, remaining: usize },

    /// A null-terminated string read found no zero byte.
    #[error("no string terminator in the remaining {remaining} bytes")]
    MissingTerminator { remaining: usize },
}

/// A datagram could not be Huffman-decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HuffmanError {
    /// The header byte claims more padding bits than the payload has.
    #[error("padding of {padding} bits exceeds the {available} payload bits")]
    InvalidPadding { padding: u8, available: usize },

    /// The bit stream walked off the code tree.
    #[error("invalid huffman code at bit {bit}")]
    InvalidCode { bit: usize },
}

/// Errors from encoding or validating control-plane messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: malformed JSON, wrong field types, or
    /// truncated input.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The request parsed but is not a valid control request.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
