//! In-process store backend

use crate::error::StoreResult;
use crate::store::{ReplicatedStore, StoreEvent, EVENT_CHANNEL_CAPACITY};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Store backed by a shared in-memory map
///
/// Clones share the same map and notification channel, so handing clones
/// to several coordinators models several members of one cluster.
#[derive(Clone)]
pub struct MemoryStore {
    directory: String,
    entries: Arc<RwLock<HashMap<String, String>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    /// Create an empty store for a directory
    pub fn new(directory: &str) -> Self {
        Self::with_capacity(directory, EVENT_CHANNEL_CAPACITY)
    }

    /// Create an empty store keeping at most `capacity` undelivered events
    pub fn with_capacity(directory: &str, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            directory: directory.to_string(),
            entries: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

#[async_trait::async_trait]
impl ReplicatedStore for MemoryStore {
    fn directory(&self) -> &str {
        &self.directory
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        let previous = self
            .entries
            .write()
            .insert(key.to_string(), value.to_string());

        match previous {
            Some(_) => self.notify(StoreEvent::modified(key, value)),
            None => self.notify(StoreEvent::created(key, value)),
        }
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<Option<String>> {
        let existing = {
            let mut entries = self.entries.write();
            match entries.get(key) {
                Some(existing) => Some(existing.clone()),
                None => {
                    entries.insert(key.to_string(), value.to_string());
                    None
                }
            }
        };

        if existing.is_none() {
            self.notify(StoreEvent::created(key, value));
        }
        Ok(existing)
    }

    async fn replace(&self, key: &str, value: &str) -> StoreResult<Option<String>> {
        let previous = {
            let mut entries = self.entries.write();
            match entries.get_mut(key) {
                Some(slot) => Some(std::mem::replace(slot, value.to_string())),
                None => None,
            }
        };

        if previous.is_some() {
            self.notify(StoreEvent::modified(key, value));
        }
        Ok(previous)
    }

    async fn remove(&self, key: &str) -> StoreResult<Option<String>> {
        let removed = self.entries.write().remove(key);
        if removed.is_some() {
            self.notify(StoreEvent::removed(key));
        }
        Ok(removed)
    }

    async fn entries(&self) -> StoreResult<Vec<(String, String)>> {
        let mut all: Vec<_> = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreEventKind;

    #[tokio::test]
    async fn test_put_if_absent_first_writer_wins() {
        let store = MemoryStore::new("parcels");

        assert_eq!(store.put_if_absent("k", "first").await.unwrap(), None);
        assert_eq!(
            store.put_if_absent("k", "second").await.unwrap(),
            Some("first".to_string())
        );
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_replace_only_when_present() {
        let store = MemoryStore::new("watchdog");

        assert_eq!(store.replace("k", "v1").await.unwrap(), None);
        assert!(store.is_empty());

        store.put("k", "v1").await.unwrap();
        assert_eq!(store.replace("k", "v2").await.unwrap().as_deref(), Some("v1"));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_notifications() {
        let store = MemoryStore::new("parcels");
        let mut rx = store.subscribe();

        store.put("a", "1").await.unwrap();
        store.put("a", "2").await.unwrap();
        store.put_if_absent("a", "3").await.unwrap();
        store.remove("a").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().kind, StoreEventKind::Created);
        let modified = rx.recv().await.unwrap();
        assert_eq!(modified.kind, StoreEventKind::Modified);
        assert_eq!(modified.value.as_deref(), Some("2"));
        // The losing put_if_absent raises nothing
        assert_eq!(rx.recv().await.unwrap().kind, StoreEventKind::Removed);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new("capability");
        let other = store.clone();

        store.put("k", "v").await.unwrap();
        assert_eq!(other.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(other.entries().await.unwrap().len(), 1);
    }
}
