//! # doomhost
//!
//! Control-plane daemon that hosts Zandronum game servers on demand.
//!
//! Clients connect over TCP, authenticate with a shared secret and an
//! account, and ask the daemon to host a server, kill one, or upload a
//! wad. Each hosted server is an engine child process watched by its own
//! supervisor task.
//!
//! # Key types
//!
//! - [`AppConfig`]: the TOML configuration.
//! - [`DoomhostServer`]: the control listener and its accept loop.
//! - [`DoomhostError`]: wraps every crate error.
//!
//! ```rust,no_run
//! use doomhost::{AppConfig, DoomhostServer};
//!
//! # async fn start() -> Result<(), doomhost::DoomhostError> {
//! let config = AppConfig::load_from_file(std::path::Path::new("doomhost.toml")).await?;
//! config.validate()?;
//! DoomhostServer::builder(config).build().await?.run().await
//! # }
//! ```

pub mod cli;
pub mod config;
mod error;
mod handler;
pub mod logging;
mod server;
pub mod signals;
pub mod upload;

pub use config::AppConfig;
pub use error::{DoomhostError, StartupError};
pub use logging::setup_logging;
pub use server::{DoomhostServer, DoomhostServerBuilder};
