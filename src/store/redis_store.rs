//! Redis-backed replicated store
//!
//! Each directory is a key namespace `{prefix}:{directory}:{key}` plus a
//! pub/sub channel `{prefix}:{directory}:events`. Every mutation publishes a
//! JSON [`StoreEvent`]; a listener task re-broadcasts the channel locally, so
//! every member of the cluster (this process included) sees every change.
//!
//! Requires Redis 7 or later (`SET ... NX GET`).

use crate::error::{StoreError, StoreResult};
use crate::store::{ReplicatedStore, StoreEvent, EVENT_CHANNEL_CAPACITY};

use futures::StreamExt;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// Default namespace for all mesh keys
pub const DEFAULT_KEY_PREFIX: &str = "parcel-mesh";

/// Number of keys requested per SCAN round trip
const SCAN_BATCH: usize = 256;

/// Configuration for a Redis store
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL
    pub url: String,
    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl RedisStoreConfig {
    /// Create config with custom Redis URL
    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// Namespace shared by all keys of a directory
    pub fn directory_namespace(&self, directory: &str) -> String {
        format!("{}:{}:", self.key_prefix, directory)
    }

    /// Full Redis key of a directory entry
    pub fn entry_key(&self, directory: &str, key: &str) -> String {
        format!("{}{}", self.directory_namespace(directory), key)
    }

    /// Pub/sub channel carrying a directory's notifications
    pub fn events_channel(&self, directory: &str) -> String {
        format!("{}:{}:events", self.key_prefix, directory)
    }
}

/// One directory of a Redis-backed replicated store
pub struct RedisStore {
    directory: String,
    connection: Arc<RwLock<MultiplexedConnection>>,
    config: RedisStoreConfig,
    events: broadcast::Sender<StoreEvent>,
    listener: JoinHandle<()>,
}

impl RedisStore {
    /// Connect to Redis and start relaying the directory's notifications
    pub async fn connect(config: RedisStoreConfig, directory: &str) -> StoreResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| StoreError::ConnectionFailed {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::ConnectionFailed {
                url: config.url.clone(),
                reason: e.to_string(),
            })?;

        let mut pubsub = client.get_async_pubsub().await.map_err(|e| {
            StoreError::ConnectionFailed {
                url: config.url.clone(),
                reason: e.to_string(),
            }
        })?;
        let channel = config.events_channel(directory);
        pubsub.subscribe(&channel).await?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let relay = events.clone();
        let listener = tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(channel = %channel, "Unreadable store notification: {}", e);
                        continue;
                    }
                };
                match serde_json::from_str::<StoreEvent>(&payload) {
                    Ok(event) => {
                        let _ = relay.send(event);
                    }
                    Err(e) => {
                        tracing::warn!(channel = %channel, "Malformed store notification: {}", e);
                    }
                }
            }
            tracing::debug!(channel = %channel, "Store notification stream ended");
        });

        tracing::debug!(directory, url = %config.url, "Connected Redis store");

        Ok(Self {
            directory: directory.to_string(),
            connection: Arc::new(RwLock::new(connection)),
            config,
            events,
            listener,
        })
    }

    fn entry_key(&self, key: &str) -> String {
        self.config.entry_key(&self.directory, key)
    }

    async fn publish(&self, event: StoreEvent) -> StoreResult<()> {
        let payload =
            serde_json::to_string(&event).map_err(|e| StoreError::OperationFailed(e.to_string()))?;
        let mut conn = self.connection.write().await;
        conn.publish::<_, _, ()>(self.config.events_channel(&self.directory), payload)
            .await?;
        Ok(())
    }
}

/// Keep the outcome of a completed write when its notification fails
///
/// The entry is already stored; peers that miss the event pick it up on
/// their next read or rescan.
fn settle_publish<T>(directory: &str, key: &str, written: T, published: StoreResult<()>) -> T {
    if let Err(e) = published {
        tracing::warn!(directory, key, "Write stored but change notification failed: {}", e);
    }
    written
}

impl Drop for RedisStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait::async_trait]
impl ReplicatedStore for RedisStore {
    fn directory(&self) -> &str {
        &self.directory
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection.write().await;
        let value: Option<String> = conn.get(self.entry_key(key)).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        let previous: Option<String> = {
            let mut conn = self.connection.write().await;
            redis::cmd("SET")
                .arg(self.entry_key(key))
                .arg(value)
                .arg("GET")
                .query_async(&mut *conn)
                .await?
        };

        let event = match previous {
            Some(_) => StoreEvent::modified(key, value),
            None => StoreEvent::created(key, value),
        };
        let published = self.publish(event).await;
        Ok(settle_publish(&self.directory, key, (), published))
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> StoreResult<Option<String>> {
        // NX with GET returns the existing value and leaves it untouched
        let existing: Option<String> = {
            let mut conn = self.connection.write().await;
            redis::cmd("SET")
                .arg(self.entry_key(key))
                .arg(value)
                .arg("NX")
                .arg("GET")
                .query_async(&mut *conn)
                .await?
        };

        if existing.is_none() {
            let published = self.publish(StoreEvent::created(key, value)).await;
            return Ok(settle_publish(&self.directory, key, existing, published));
        }
        Ok(existing)
    }

    async fn replace(&self, key: &str, value: &str) -> StoreResult<Option<String>> {
        let previous: Option<String> = {
            let mut conn = self.connection.write().await;
            redis::cmd("SET")
                .arg(self.entry_key(key))
                .arg(value)
                .arg("XX")
                .arg("GET")
                .query_async(&mut *conn)
                .await?
        };

        if previous.is_some() {
            let published = self.publish(StoreEvent::modified(key, value)).await;
            return Ok(settle_publish(&self.directory, key, previous, published));
        }
        Ok(previous)
    }

    async fn remove(&self, key: &str) -> StoreResult<Option<String>> {
        let removed: Option<String> = {
            let mut conn = self.connection.write().await;
            redis::cmd("GETDEL")
                .arg(self.entry_key(key))
                .query_async(&mut *conn)
                .await?
        };

        if removed.is_some() {
            let published = self.publish(StoreEvent::removed(key)).await;
            return Ok(settle_publish(&self.directory, key, removed, published));
        }
        Ok(removed)
    }

    async fn entries(&self) -> StoreResult<Vec<(String, String)>> {
        let namespace = self.config.directory_namespace(&self.directory);
        let pattern = format!("{}*", namespace);
        let mut conn = self.connection.write().await;

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut *conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        keys.sort();
        keys.dedup();

        let mut entries = Vec::with_capacity(keys.len());
        for full_key in keys {
            let Some(key) = full_key.strip_prefix(&namespace) else {
                continue;
            };
            let value: Option<String> = conn.get(&full_key).await?;
            if let Some(value) = value {
                entries.push((key.to_string(), value));
            }
        }
        Ok(entries)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exercising the store itself requires a running Redis instance;
    // these cover configuration and key layout.

    #[test]
    fn test_config_defaults() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert_eq!(config.key_prefix, "parcel-mesh");
    }

    #[test]
    fn test_config_with_url() {
        let config = RedisStoreConfig::with_url("redis://site-b:6380");
        assert_eq!(config.url, "redis://site-b:6380");
        assert_eq!(config.key_prefix, DEFAULT_KEY_PREFIX);
    }

    #[test]
    fn test_key_layout() {
        let config = RedisStoreConfig::default();
        assert_eq!(
            config.entry_key("parcels", "function=ingest.parcel=primary"),
            "parcel-mesh:parcels:function=ingest.parcel=primary"
        );
        assert_eq!(config.events_channel("parcels"), "parcel-mesh:parcels:events");
        assert!(config
            .entry_key("watchdog", "wup=a")
            .starts_with(&config.directory_namespace("watchdog")));
    }

    #[test]
    fn test_failed_notification_keeps_write_result() {
        let failed = Err(StoreError::OperationFailed("connection reset".to_string()));
        let existing: Option<String> = None;
        assert_eq!(settle_publish("parcels", "function=ingest.parcel=a", existing, failed), None);

        let failed = Err(StoreError::Closed);
        let previous = Some("{}".to_string());
        assert_eq!(
            settle_publish("parcels", "function=ingest.parcel=a", previous.clone(), failed),
            previous
        );
        assert_eq!(settle_publish("watchdog", "wup=a", 7, Ok(())), 7);
    }
}
