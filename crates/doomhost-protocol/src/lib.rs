//! Wire formats for doomhost.
//!
//! Two families of formats live here:
//!
//! - **Engine side**: [`ByteBuffer`] for the typed little-endian fields of
//!   launcher and RCON datagrams, and the [`huffman`] codec every engine
//!   datagram is wrapped in.
//! - **Control side**: [`ControlRequest`] / [`ControlReply`] and the
//!   [`Codec`] that turns them into frame bodies.
//!
//! Nothing in this crate touches a socket.
//!
//! ```text
//! engine datagram ─ huffman ─ ByteBuffer ─ query / rcon
//! control frame ─ JsonCodec ─ ControlRequest ─ handler
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod bytebuffer;
mod codec;
mod error;
pub mod huffman;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use bytebuffer::{ByteBuffer, Endian};
pub use codec::{Codec, JsonCodec};
pub use error::{BufferError, HuffmanError, ProtocolError};
pub use types::{Action, ControlReply, ControlRequest, ServerId, Status};
