//! Clients for the engine's own UDP protocols.
//!
//! - [`query`]: the unauthenticated launcher status probe.
//! - [`rcon`]: the salted remote console login and command send.
//!
//! Both are single round trips over a [`HuffmanSocket`](doomhost_transport::HuffmanSocket)
//! with a 5 second receive timeout and no retry.

mod error;
pub mod query;
pub mod rcon;

pub use error::{QueryError, RconError};
pub use query::{GameMode, QueryFlags, ServerInfo};
pub use rcon::RconClient;
