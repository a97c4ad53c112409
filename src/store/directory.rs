//! Typed JSON records over a replicated store

use crate::error::{RecordError, RecordResult};
use crate::store::{ReplicatedStore, StoreEvent};

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A store directory whose values are JSON-encoded `T`
pub struct RecordDirectory<T> {
    store: Arc<dyn ReplicatedStore>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for RecordDirectory<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _record: PhantomData,
        }
    }
}

impl<T> RecordDirectory<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn ReplicatedStore>) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// Directory name of the underlying store
    pub fn name(&self) -> &str {
        self.store.directory()
    }

    /// Untyped store underneath
    pub fn store(&self) -> Arc<dyn ReplicatedStore> {
        Arc::clone(&self.store)
    }

    /// Decode a raw stored value
    pub fn decode(key: &str, raw: &str) -> RecordResult<T> {
        serde_json::from_str(raw).map_err(|e| RecordError::MalformedRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(record: &T) -> RecordResult<String> {
        serde_json::to_string(record).map_err(|e| RecordError::Serialization(e.to_string()))
    }

    pub async fn get(&self, key: &str) -> RecordResult<Option<T>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(Self::decode(key, &raw)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, key: &str, record: &T) -> RecordResult<()> {
        let raw = Self::encode(record)?;
        self.store.put(key, &raw).await?;
        Ok(())
    }

    /// Insert unless present; returns the already stored record otherwise
    pub async fn put_if_absent(&self, key: &str, record: &T) -> RecordResult<Option<T>> {
        let raw = Self::encode(record)?;
        match self.store.put_if_absent(key, &raw).await? {
            Some(existing) => Ok(Some(Self::decode(key, &existing)?)),
            None => Ok(None),
        }
    }

    /// Overwrite if present; returns whether an entry was replaced
    pub async fn replace(&self, key: &str, record: &T) -> RecordResult<bool> {
        let raw = Self::encode(record)?;
        Ok(self.store.replace(key, &raw).await?.is_some())
    }

    /// Delete an entry; returns whether one existed
    pub async fn remove(&self, key: &str) -> RecordResult<bool> {
        Ok(self.store.remove(key).await?.is_some())
    }

    /// All decodable entries; malformed ones are logged and skipped
    pub async fn entries(&self) -> RecordResult<Vec<(String, T)>> {
        let raw = self.store.entries().await?;
        let mut records = Vec::with_capacity(raw.len());
        for (key, value) in raw {
            match Self::decode(&key, &value) {
                Ok(record) => records.push((key, record)),
                Err(e) => {
                    tracing::error!(directory = self.name(), key = %key, "Skipping record: {}", e);
                }
            }
        }
        Ok(records)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        name: String,
        count: u32,
    }

    fn directory() -> (MemoryStore, RecordDirectory<Entry>) {
        let store = MemoryStore::new("test");
        let dir = RecordDirectory::new(Arc::new(store.clone()));
        (store, dir)
    }

    #[tokio::test]
    async fn test_typed_put_if_absent_returns_stored_record() {
        let (_, dir) = directory();
        let first = Entry { name: "a".into(), count: 1 };
        let second = Entry { name: "b".into(), count: 2 };

        assert!(dir.put_if_absent("k", &first).await.unwrap().is_none());
        assert_eq!(dir.put_if_absent("k", &second).await.unwrap(), Some(first.clone()));
        assert_eq!(dir.get("k").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_malformed_value() {
        let (store, dir) = directory();
        store.put("bad", "not json").await.unwrap();

        let err = dir.get("bad").await.unwrap_err();
        assert!(matches!(err, RecordError::MalformedRecord { ref key, .. } if key == "bad"));
    }

    #[tokio::test]
    async fn test_entries_skip_malformed() {
        let (store, dir) = directory();
        dir.put("good", &Entry { name: "g".into(), count: 3 }).await.unwrap();
        store.put("bad", "{").await.unwrap();

        let entries = dir.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "good");
    }

    #[tokio::test]
    async fn test_replace_and_remove() {
        let (_, dir) = directory();
        let entry = Entry { name: "x".into(), count: 0 };

        assert!(!dir.replace("k", &entry).await.unwrap());
        dir.put("k", &entry).await.unwrap();
        assert!(dir.replace("k", &Entry { count: 9, ..entry }).await.unwrap());
        assert_eq!(dir.get("k").await.unwrap().unwrap().count, 9);
        assert!(dir.remove("k").await.unwrap());
        assert!(dir.get("k").await.unwrap().is_none());
    }
}
