//! Replicated key-value store contract
//!
//! The mesh relies on a small set of store primitives only:
//!
//! - `get` / `put` (unconditional upsert) / `replace` (only if present)
//! - `put_if_absent`: the single atomic primitive, used exclusively for
//!   parcel registration
//! - creation and modification notifications, delivered at least once to
//!   every subscriber
//!
//! Two backends are provided: [`MemoryStore`] for a single process (and
//! tests, where several coordinators sharing one store act as one cluster)
//! and [`RedisStore`] for a real deployment. [`RecordDirectory`] layers
//! typed JSON records on top of either.

mod directory;
mod memory;
mod redis_store;

pub use directory::RecordDirectory;
pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig, DEFAULT_KEY_PREFIX};

use crate::error::StoreResult;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Directory holding parcel records keyed by parcel identifier
pub const PARCEL_DIRECTORY: &str = "parcels";

/// Directory holding watchdog entries keyed by component identifier
pub const WATCHDOG_DIRECTORY: &str = "watchdog";

/// Directory mapping multicast base UoW identity to participating WUPs
pub const MULTICAST_DIRECTORY: &str = "multicast";

/// Directory mapping function identity to capable WUPs
pub const CAPABILITY_DIRECTORY: &str = "capability";

/// Capacity of local notification channels
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Kind of store mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEventKind {
    /// Key did not exist before
    Created,
    /// Existing key was overwritten
    Modified,
    /// Key was deleted
    Removed,
}

/// Notification raised by a store mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub kind: StoreEventKind,
    pub key: String,
    /// New value; absent for removals
    pub value: Option<String>,
}

impl StoreEvent {
    pub fn created(key: &str, value: &str) -> Self {
        Self {
            kind: StoreEventKind::Created,
            key: key.to_string(),
            value: Some(value.to_string()),
        }
    }

    pub fn modified(key: &str, value: &str) -> Self {
        Self {
            kind: StoreEventKind::Modified,
            key: key.to_string(),
            value: Some(value.to_string()),
        }
    }

    pub fn removed(key: &str) -> Self {
        Self {
            kind: StoreEventKind::Removed,
            key: key.to_string(),
            value: None,
        }
    }

    /// Whether this notification announces a new entry
    pub fn is_creation(&self) -> bool {
        self.kind == StoreEventKind::Created
    }
}

/// Primitive operations the mesh needs from a replicated store
#[async_trait::async_trait]
pub trait ReplicatedStore: Send + Sync {
    /// Name of the directory this store instance serves
    fn directory(&self) -> &str;

    /// Read a value
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditional upsert
    async fn put(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Atomic insert; returns the existing value if the key was present
    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<Option<String>>;

    /// Overwrite only if present; returns the previous value
    async fn replace(&self, key: &str, value: &str) -> StoreResult<Option<String>>;

    /// Delete a key; returns the removed value
    async fn remove(&self, key: &str) -> StoreResult<Option<String>>;

    /// Snapshot of all entries in this directory
    async fn entries(&self) -> StoreResult<Vec<(String, String)>>;

    /// Subscribe to mutation notifications
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
