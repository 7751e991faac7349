//! The registry of hosted instances and the ports they hold.
//!
//! Port allocation and instance registration happen under one lock, so a
//! port is never handed to two instances. Supervisors remove their own
//! entry when the process ends; removal is keyed by port and server id and
//! succeeds at most once.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use doomhost_protocol::ServerId;
use doomhost_session::{AccountStore, UserRecord, generate_server_id};

use crate::command::build_command;
use crate::supervisor::{Launch, spawn_supervisor};
use crate::{HostRequest, InstanceError, LaunchSettings, PortPool, ServerHandle, ServerSummary};

struct Tables {
    ports: PortPool,
    servers: BTreeMap<u16, ServerHandle>,
}

struct Shared {
    tables: Mutex<Tables>,
    launch: LaunchSettings,
    store: Arc<dyn AccountStore>,
}

/// Shared registry of live instances. Cheap to clone.
#[derive(Clone)]
pub struct ServerRegistry {
    shared: Arc<Shared>,
}

impl ServerRegistry {
    pub fn new(ports: PortPool, launch: LaunchSettings, store: Arc<dyn AccountStore>) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(Tables {
                    ports,
                    servers: BTreeMap::new(),
                }),
                launch,
                store,
            }),
        }
    }

    pub fn launch_settings(&self) -> &LaunchSettings {
        &self.shared.launch
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.shared.store
    }

    /// Starts a new instance for `owner` on the lowest free port.
    ///
    /// The server record is written to the account store before the
    /// process starts. Store failures are logged and do not stop hosting.
    ///
    /// # Errors
    /// - [`InstanceError::NoFreePort`] if the pool is exhausted.
    /// - [`InstanceError::Spawn`] if the engine could not be started. The
    ///   port is returned to the pool.
    pub fn host(&self, request: HostRequest, owner: &UserRecord) -> Result<ServerHandle, InstanceError> {
        let id = generate_server_id();
        let mut tables = self.lock();

        let Some(port) = tables.ports.allocate() else {
            let (min, max) = tables.ports.range();
            tracing::warn!(min, max, "port pool exhausted");
            return Err(InstanceError::NoFreePort { min, max });
        };

        self.record_server(owner, &id, &request, port);

        let launch = Launch {
            argv: build_command(&request, &self.shared.launch, port),
            id: id.clone(),
            port,
            owner: owner.username.clone(),
            request: Arc::new(request),
            ready_marker: self.shared.launch.ready_marker.clone(),
        };
        tracing::debug!(server_id = %id, port, argv = ?launch.argv, "launching engine");

        match spawn_supervisor(launch, self.clone(), Arc::clone(&self.shared.store)) {
            Ok(handle) => {
                tables.servers.insert(port, handle.clone());
                tracing::info!(server_id = %id, port, owner = %owner.username, "instance hosted");
                Ok(handle)
            }
            Err(e) => {
                tables.ports.release(port);
                tracing::error!(server_id = %id, port, error = %e, "failed to start engine");
                Err(e)
            }
        }
    }

    fn record_server(&self, owner: &UserRecord, id: &ServerId, request: &HostRequest, port: u16) {
        let store = &self.shared.store;
        let recorded = store
            .add_server(owner.id, id, &request.wads)
            .and_then(|()| store.update_port(id, port));
        if let Err(e) = recorded {
            tracing::warn!(server_id = %id, port, error = %e, "failed to record server");
        }
    }

    /// Removes the instance on `port` if it is still the one named `id`,
    /// and frees the port.
    pub(crate) fn remove(&self, port: u16, id: &ServerId) -> Option<ServerHandle> {
        let mut tables = self.lock();
        if tables.servers.get(&port).is_none_or(|handle| handle.id() != id) {
            return None;
        }
        let handle = tables.servers.remove(&port);
        tables.ports.release(port);
        tracing::debug!(server_id = %id, port, "instance removed");
        handle
    }

    pub fn get(&self, port: u16) -> Option<ServerHandle> {
        self.lock().servers.get(&port).cloned()
    }

    /// Returns `true` if `port` is inside the configured range.
    pub fn in_range(&self, port: u16) -> bool {
        self.lock().ports.contains(port)
    }

    pub fn port_range(&self) -> (u16, u16) {
        self.lock().ports.range()
    }

    pub fn is_port_allocated(&self, port: u16) -> bool {
        self.lock().ports.is_allocated(port)
    }

    /// Handles to every live instance, ordered by port.
    pub fn handles(&self) -> Vec<ServerHandle> {
        self.lock().servers.values().cloned().collect()
    }

    pub fn list(&self) -> Vec<ServerSummary> {
        self.handles().iter().map(ServerHandle::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().servers.is_empty()
    }

    /// Kills every live instance and waits for each to close. Returns how
    /// many were running.
    pub async fn kill_all(&self) -> usize {
        let handles = self.handles();
        for handle in &handles {
            let reason = handle.kill().await;
            tracing::info!(server_id = %handle.id(), port = handle.port(), %reason, "instance shut down");
        }
        handles.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.shared.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
