//! `DoomhostServer` builder and accept loop.
//!
//! Ties the layers together: control listener, account store, instance
//! registry and resource monitor.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use doomhost_instance::{FieldPolicy, ServerRegistry};
use doomhost_monitor::{MonitorConfig, spawn_monitor};
use doomhost_protocol::JsonCodec;
use doomhost_session::{AccountStore, BanList, MemoryStore};
use doomhost_transport::ControlListener;
use tracing::{debug, error, info};

use crate::DoomhostError;
use crate::config::{AppConfig, DirectorySettings};
use crate::handler::handle_connection;
use crate::signals::shutdown_signal;

/// State the accept loop hands to each connection in turn.
///
/// Connections are handled one after another, so this is owned by the
/// loop and borrowed mutably; only the registry is shared with
/// supervisor tasks.
pub(crate) struct ServerState {
    pub(crate) secret: String,
    pub(crate) bans: BanList,
    pub(crate) store: Arc<dyn AccountStore>,
    pub(crate) registry: ServerRegistry,
    pub(crate) codec: JsonCodec,
    pub(crate) field_policy: FieldPolicy,
    pub(crate) startup_wait: Duration,
    pub(crate) directories: DirectorySettings,
    pub(crate) max_upload_bytes: u64,
}

/// Builder for configuring and starting the daemon.
///
/// # Example
///
/// ```rust,ignore
/// let server = DoomhostServer::builder(config).build().await?;
/// server.run().await
/// ```
pub struct DoomhostServerBuilder {
    config: AppConfig,
    store: Option<Arc<dyn AccountStore>>,
}

impl DoomhostServerBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self { config, store: None }
    }

    /// Overrides `network.bind_address`.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.network.bind_address = addr.to_string();
        self
    }

    /// Uses `store` instead of a [`MemoryStore`] seeded from the
    /// configured accounts.
    pub fn store(mut self, store: Arc<dyn AccountStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Creates the file directories and binds the control listener.
    pub async fn build(self) -> Result<DoomhostServer, DoomhostError> {
        let config = self.config;
        config.create_directories().await?;

        let store: Arc<dyn AccountStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::with_accounts(
                config
                    .accounts
                    .iter()
                    .map(|a| (a.username.as_str(), a.password.as_str())),
            )),
        };
        let registry = ServerRegistry::new(config.port_pool()?, config.launch_settings(), Arc::clone(&store));
        let listener = ControlListener::bind(&config.network.bind_address).await?;

        let state = ServerState {
            secret: config.network.secret.clone(),
            bans: BanList::new(config.ban_duration()),
            store,
            registry,
            codec: JsonCodec,
            field_policy: config.engine.field_policy,
            startup_wait: config.startup_wait(),
            directories: config.directories.clone(),
            max_upload_bytes: config.upload.max_bytes,
        };

        Ok(DoomhostServer {
            listener,
            state,
            monitor: config.monitor,
        })
    }
}

/// The control-plane daemon.
pub struct DoomhostServer {
    listener: ControlListener,
    state: ServerState,
    monitor: MonitorConfig,
}

impl DoomhostServer {
    pub fn builder(config: AppConfig) -> DoomhostServerBuilder {
        DoomhostServerBuilder::new(config)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the live instances. Clones share the same registry.
    pub fn registry(&self) -> ServerRegistry {
        self.state.registry.clone()
    }

    /// Serves until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<(), DoomhostError> {
        self.run_until(shutdown_signal()).await
    }

    /// Serves until `shutdown` resolves, then kills every live instance.
    ///
    /// Connections are processed strictly one at a time. A failing
    /// connection is logged and never stops the loop.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<(), DoomhostError>
    where
        F: Future<Output = ()>,
    {
        let monitor = spawn_monitor(self.monitor.clone(), self.state.registry.clone());
        let (min_port, max_port) = self.state.registry.port_range();
        info!(
            addr = ?self.listener.local_addr().ok(),
            min_port,
            max_port,
            "doomhost running"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => {
                        let conn_id = conn.id();
                        if let Err(e) = handle_connection(conn, &mut self.state).await {
                            debug!(%conn_id, error = %e, "connection ended with error");
                        }
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },
            }
        }

        if let Some(monitor) = monitor {
            monitor.abort();
        }
        let killed = self.state.registry.kill_all().await;
        info!(killed, "doomhost stopped");
        Ok(())
    }
}
