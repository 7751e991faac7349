//! Unified error type for the doomhost daemon.

use std::path::PathBuf;

use doomhost_engine::{QueryError, RconError};
use doomhost_instance::InstanceError;
use doomhost_protocol::ProtocolError;
use doomhost_session::StoreError;
use doomhost_transport::TransportError;

/// Conditions that stop the daemon before it serves a single request.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to read config {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The file parsed but a value is unusable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tracing subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DoomhostError {
    #[error(transparent)]
    Startup(#[from] StartupError),

    /// A control connection failed (accept, read, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A control message could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Hosting or supervising an instance failed.
    #[error(transparent)]
    Instance(#[from] InstanceError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Rcon(#[from] RconError),
}
