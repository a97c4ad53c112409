//! Durable archive for parcels
//!
//! Used for the synchronous "critical write": when enabled, parcels are
//! persisted here on registration and before they are marked FINALISED.

mod schema;
mod sqlite;

pub use schema::{create_archive, SCHEMA_VERSION};
pub use sqlite::{ArchivedParcel, SqliteArchive};

use crate::error::ArchiveResult;
use crate::task::Parcel;

/// Synchronous durable store for parcel records
#[async_trait::async_trait]
pub trait ParcelArchive: Send + Sync {
    /// Persist a parcel, replacing any earlier copy under the same key
    async fn archive(&self, parcel: &Parcel) -> ArchiveResult<()>;
}
