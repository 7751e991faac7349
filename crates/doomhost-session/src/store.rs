//! Account and server-record persistence.
//!
//! doomhost does not own the account database; it talks to it through the
//! [`AccountStore`] trait. The daemon ships with [`MemoryStore`], seeded
//! from the configuration file, which is enough for a single-host setup
//! and for tests. A SQL-backed store only has to implement the same seven
//! methods.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use doomhost_protocol::ServerId;

use crate::StoreError;

/// A user account as the control plane sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub level: u8,
    pub activated: bool,
    pub server_limit: u32,
}

/// Persisted state of one hosted server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRecord {
    pub user_id: u64,
    pub wads: Vec<String>,
    pub port: Option<u16>,
    pub online: bool,
}

/// The persistence collaborator.
///
/// Calls are synchronous and short. `Send + Sync` because the store is
/// shared between the control listener and every supervisor task.
pub trait AccountStore: Send + Sync + 'static {
    /// Returns `true` if `username` exists and `password` matches.
    fn check_login(&self, username: &str, password: &str) -> Result<bool, StoreError>;

    fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Creates a new, not yet activated account.
    ///
    /// # Errors
    /// [`StoreError::UserExists`] if the name is taken.
    fn create_user(&self, username: &str, password: &str, email: &str) -> Result<UserRecord, StoreError>;

    /// Records a freshly hosted server and the wads it loads. The server
    /// starts out offline with no port.
    fn add_server(&self, user_id: u64, server_id: &ServerId, wads: &[String]) -> Result<(), StoreError>;

    fn update_port(&self, server_id: &ServerId, port: u16) -> Result<(), StoreError>;

    /// Marks the server online.
    fn set_server_online(&self, server_id: &ServerId) -> Result<(), StoreError>;

    /// Flips the server's online flag.
    fn toggle_online(&self, server_id: &ServerId) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Account with its credential, never handed out.
#[derive(Debug)]
struct Account {
    record: UserRecord,
    password: String,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    servers: HashMap<ServerId, ServerRecord>,
    next_user_id: u64,
}

/// In-process [`AccountStore`].
///
/// Passwords are compared as given; this store is meant for accounts
/// seeded from a local configuration file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

/// Default server limit for new accounts.
const DEFAULT_SERVER_LIMIT: u32 = 4;

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store with one activated account per `(username, password)`.
    pub fn with_accounts<'a>(accounts: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            for (username, password) in accounts {
                let record = inner.insert_account(username, password, "");
                if let Some(account) = inner.accounts.get_mut(&record.username) {
                    account.record.activated = true;
                }
            }
        }
        store
    }

    /// Snapshot of a server record.
    pub fn server(&self, server_id: &ServerId) -> Option<ServerRecord> {
        self.lock().servers.get(server_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn insert_account(&mut self, username: &str, password: &str, email: &str) -> UserRecord {
        self.next_user_id += 1;
        let record = UserRecord {
            id: self.next_user_id,
            username: username.to_string(),
            email: email.to_string(),
            level: 1,
            activated: false,
            server_limit: DEFAULT_SERVER_LIMIT,
        };
        self.accounts.insert(
            username.to_string(),
            Account {
                record: record.clone(),
                password: password.to_string(),
            },
        );
        record
    }

    fn server_mut(&mut self, server_id: &ServerId) -> Result<&mut ServerRecord, StoreError> {
        self.servers
            .get_mut(server_id)
            .ok_or_else(|| StoreError::UnknownServer(server_id.clone()))
    }
}

impl AccountStore for MemoryStore {
    fn check_login(&self, username: &str, password: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .accounts
            .get(username)
            .is_some_and(|a| a.password == password))
    }

    fn get_user(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.lock().accounts.get(username).map(|a| a.record.clone()))
    }

    fn create_user(&self, username: &str, password: &str, email: &str) -> Result<UserRecord, StoreError> {
        let mut inner = self.lock();
        if inner.accounts.contains_key(username) {
            return Err(StoreError::UserExists(username.to_string()));
        }
        let record = inner.insert_account(username, password, email);
        tracing::info!(username, user_id = record.id, "account created");
        Ok(record)
    }

    fn add_server(&self, user_id: u64, server_id: &ServerId, wads: &[String]) -> Result<(), StoreError> {
        self.lock().servers.insert(
            server_id.clone(),
            ServerRecord {
                user_id,
                wads: wads.to_vec(),
                port: None,
                online: false,
            },
        );
        Ok(())
    }

    fn update_port(&self, server_id: &ServerId, port: u16) -> Result<(), StoreError> {
        self.lock().server_mut(server_id)?.port = Some(port);
        Ok(())
    }

    fn set_server_online(&self, server_id: &ServerId) -> Result<(), StoreError> {
        self.lock().server_mut(server_id)?.online = true;
        Ok(())
    }

    fn toggle_online(&self, server_id: &ServerId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner.server_mut(server_id)?;
        record.online = !record.online;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> ServerId {
        ServerId(s.to_string())
    }

    #[test]
    fn test_check_login_matches_seeded_account() {
        let store = MemoryStore::with_accounts([("alice", "pw1")]);
        assert!(store.check_login("alice", "pw1").unwrap());
        assert!(!store.check_login("alice", "nope").unwrap());
        assert!(!store.check_login("bob", "pw1").unwrap());
    }

    #[test]
    fn test_seeded_accounts_are_activated() {
        let store = MemoryStore::with_accounts([("alice", "pw1"), ("bob", "pw2")]);
        let alice = store.get_user("alice").unwrap().unwrap();
        let bob = store.get_user("bob").unwrap().unwrap();
        assert!(alice.activated);
        assert_ne!(alice.id, bob.id);
        assert!(store.get_user("carol").unwrap().is_none());
    }

    #[test]
    fn test_create_user_rejects_duplicate() {
        let store = MemoryStore::new();
        let created = store.create_user("dave", "pw", "d@example.org").unwrap();
        assert!(!created.activated);
        assert_eq!(created.server_limit, 4);
        assert!(matches!(
            store.create_user("dave", "other", ""),
            Err(StoreError::UserExists(_))
        ));
    }

    #[test]
    fn test_server_record_lifecycle() {
        let store = MemoryStore::new();
        let id = sid("abc");
        store.add_server(7, &id, &["a.wad".into()]).unwrap();
        store.update_port(&id, 10666).unwrap();

        let record = store.server(&id).unwrap();
        assert_eq!(record.port, Some(10666));
        assert!(!record.online);

        store.set_server_online(&id).unwrap();
        assert!(store.server(&id).unwrap().online);
        store.toggle_online(&id).unwrap();
        assert!(!store.server(&id).unwrap().online);
    }

    #[test]
    fn test_update_unknown_server_fails() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update_port(&sid("missing"), 1),
            Err(StoreError::UnknownServer(_))
        ));
        assert!(store.toggle_online(&sid("missing")).is_err());
    }
}
