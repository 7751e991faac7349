//! Error types for the instance layer.

use doomhost_protocol::ServerId;

/// A host request that cannot become an instance.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// A required field is absent.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field has the wrong JSON type. Optional fields only produce this
    /// under the strict field policy.
    #[error("field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("unknown gamemode '{0}'")]
    InvalidGameMode(String),

    /// A file name that would escape its category directory.
    #[error("field '{field}' has an invalid file name '{name}'")]
    InvalidFileName { field: &'static str, name: String },
}

/// Errors from hosting or supervising instances.
#[derive(Debug, thiserror::Error)]
pub enum InstanceError {
    #[error("invalid port range {min}-{max}")]
    InvalidPortRange { min: u16, max: u16 },

    /// Every port in the pool is bound to a live instance.
    #[error("no free port in {min}-{max}")]
    NoFreePort { min: u16, max: u16 },

    /// The engine process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The supervisor task of this instance is gone.
    #[error("instance {0} is unavailable")]
    Unavailable(ServerId),

    #[error(transparent)]
    Request(#[from] RequestError),
}
