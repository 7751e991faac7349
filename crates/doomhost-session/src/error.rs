//! Error types for the session layer.

use doomhost_protocol::ServerId;

/// Errors reported by an [`AccountStore`](crate::AccountStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An account with this name already exists.
    #[error("user {0} already exists")]
    UserExists(String),

    /// No server record with this id.
    #[error("no server record for {0}")]
    UnknownServer(ServerId),

    /// The backing store could not be reached.
    #[error("account store unavailable: {0}")]
    Unavailable(String),
}
