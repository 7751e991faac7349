//! Hosted engine instances for doomhost.
//!
//! A validated [`HostRequest`] becomes a command line ([`build_command`]),
//! claims a port from the [`PortPool`], and is started by the
//! [`ServerRegistry`]. Each instance is supervised by its own Tokio task
//! and driven from outside through a [`ServerHandle`].
//!
//! # Key types
//!
//! - [`HostRequest`] / [`FieldPolicy`]: the typed request schema
//! - [`ServerRegistry`]: port claims plus live instances under one lock
//! - [`ServerHandle`]: state, startup wait, and kill for one instance
//! - [`LifecycleState`]: `Starting`, `Running`, `Closed`

mod command;
mod config;
mod error;
mod ports;
mod registry;
mod request;
mod supervisor;

pub use command::build_command;
pub use config::{CloseReason, DEFAULT_READY_MARKER, LaunchSettings, LifecycleState};
pub use error::{InstanceError, RequestError};
pub use ports::PortPool;
pub use registry::ServerRegistry;
pub use request::{FieldPolicy, GameMode, HostRequest, is_plain_file_name};
pub use supervisor::{InstanceStatus, ServerHandle, ServerSummary, StartupOutcome};
