//! Who may use the control plane, and who may not for a while.
//!
//! 1. **Accounts**: the [`AccountStore`] persistence trait and its
//!    in-memory implementation [`MemoryStore`].
//! 2. **Bans**: the [`BanList`] of addresses that presented a wrong secret.
//! 3. **Server ids**: [`generate_server_id`] for new hosted instances.

mod ban;
mod error;
mod store;

pub use ban::{BanList, DEFAULT_BAN_DURATION};
pub use error::StoreError;
pub use store::{AccountStore, MemoryStore, ServerRecord, UserRecord};

use doomhost_protocol::ServerId;
use rand::Rng;

/// Generates a random 128-bit server id as 32 lowercase hex characters.
pub fn generate_server_id() -> ServerId {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    ServerId(bytes.iter().map(|b| format!("{b:02x}")).collect())
}
