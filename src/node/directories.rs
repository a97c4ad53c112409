//! The four replicated directories a node works against

use crate::error::StoreResult;
use crate::identity::Identifier;
use crate::store::{
    MemoryStore, RecordDirectory, RedisStore, RedisStoreConfig, CAPABILITY_DIRECTORY,
    MULTICAST_DIRECTORY, PARCEL_DIRECTORY, WATCHDOG_DIRECTORY,
};
use crate::task::{Parcel, WatchdogEntry};

use std::collections::BTreeSet;
use std::sync::Arc;

/// Set of WUP identities held by a multi-value directory entry
pub type MemberSet = BTreeSet<Identifier>;

/// Handles on the parcel, watchdog, multicast and capability directories
///
/// Clones share the same underlying stores.
#[derive(Clone)]
pub struct Directories {
    pub parcels: RecordDirectory<Parcel>,
    pub watchdog: RecordDirectory<WatchdogEntry>,
    /// Multicast base UoW identity -> participating WUPs
    pub multicast: RecordDirectory<MemberSet>,
    /// Function identity -> capable WUPs
    pub capability: RecordDirectory<MemberSet>,
}

impl Directories {
    /// Fresh in-process directories
    pub fn in_memory() -> Self {
        Self {
            parcels: RecordDirectory::new(Arc::new(MemoryStore::new(PARCEL_DIRECTORY))),
            watchdog: RecordDirectory::new(Arc::new(MemoryStore::new(WATCHDOG_DIRECTORY))),
            multicast: RecordDirectory::new(Arc::new(MemoryStore::new(MULTICAST_DIRECTORY))),
            capability: RecordDirectory::new(Arc::new(MemoryStore::new(CAPABILITY_DIRECTORY))),
        }
    }

    /// Directories backed by Redis
    pub async fn connect_redis(config: &RedisStoreConfig) -> StoreResult<Self> {
        let parcels = RedisStore::connect(config.clone(), PARCEL_DIRECTORY).await?;
        let watchdog = RedisStore::connect(config.clone(), WATCHDOG_DIRECTORY).await?;
        let multicast = RedisStore::connect(config.clone(), MULTICAST_DIRECTORY).await?;
        let capability = RedisStore::connect(config.clone(), CAPABILITY_DIRECTORY).await?;

        Ok(Self {
            parcels: RecordDirectory::new(Arc::new(parcels)),
            watchdog: RecordDirectory::new(Arc::new(watchdog)),
            multicast: RecordDirectory::new(Arc::new(multicast)),
            capability: RecordDirectory::new(Arc::new(capability)),
        })
    }
}
