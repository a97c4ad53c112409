//! Best-effort delivery of records to peer sites
//!
//! Every peer is attempted concurrently with a bounded number of attempts,
//! each guarded by a timeout and separated by a fixed backoff. Exhausting the
//! budget is reported, never escalated: peer liveness is inferred from
//! heartbeats, not from forwarding failures.

use crate::error::{ConfigError, ForwardError};
use crate::store::{RedisStoreConfig, StoreEvent, PARCEL_DIRECTORY, WATCHDOG_DIRECTORY};
use crate::task::{Parcel, WatchdogEntry};

use futures::future::join_all;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Upper bound accepted for the attempt budget
pub const MAX_FORWARD_ATTEMPTS: u32 = 10;

/// Record shipped to peer sites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record")]
pub enum ForwardRecord {
    /// Liveness entry; peers upsert it
    Watchdog(WatchdogEntry),
    /// Newly registered parcel; peers insert it if absent
    Parcel(Box<Parcel>),
}

impl ForwardRecord {
    /// Key the record is stored under
    pub fn key(&self) -> String {
        match self {
            ForwardRecord::Watchdog(entry) => entry.key(),
            ForwardRecord::Parcel(parcel) => parcel.key(),
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardRecord::Watchdog(_) => "watchdog",
            ForwardRecord::Parcel(_) => "parcel",
        }
    }
}

/// Retry budget for one peer delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardPolicy {
    /// Total attempts per peer, first one included
    pub attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
    /// Upper bound on a single attempt
    pub attempt_timeout: Duration,
}

impl Default for ForwardPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(250),
            attempt_timeout: Duration::from_secs(2),
        }
    }
}

impl ForwardPolicy {
    /// Validate the budget
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attempts == 0 || self.attempts > MAX_FORWARD_ATTEMPTS {
            return Err(ConfigError::InvalidRetryBudget {
                attempts: self.attempts,
                max: MAX_FORWARD_ATTEMPTS,
            });
        }
        if self.attempt_timeout.is_zero() {
            return Err(ConfigError::InvalidInterval {
                name: "forward timeout",
            });
        }
        Ok(())
    }
}

/// Transport to a peer site
#[async_trait::async_trait]
pub trait SiteForwarder: Send + Sync {
    /// Deliver one record to one peer
    async fn forward(&self, endpoint: &str, record: &ForwardRecord) -> Result<(), ForwardError>;
}

/// Outcome of one fan-out round
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    /// Peers that acknowledged the record
    pub delivered: Vec<String>,
    /// Peers that exhausted the attempt budget, with the last error
    pub failed: Vec<(String, ForwardError)>,
}

impl FanOutReport {
    /// Whether every peer acknowledged
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deliver to a single peer within the policy's budget
///
/// Returns the number of attempts used on success.
pub async fn deliver_with_retry(
    forwarder: &dyn SiteForwarder,
    endpoint: &str,
    record: &ForwardRecord,
    policy: &ForwardPolicy,
) -> Result<u32, ForwardError> {
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let result = tokio::time::timeout(policy.attempt_timeout, forwarder.forward(endpoint, record))
            .await
            .unwrap_or_else(|_| {
                Err(ForwardError::Timeout {
                    endpoint: endpoint.to_string(),
                    millis: policy.attempt_timeout.as_millis() as u64,
                })
            });

        match result {
            Ok(()) => return Ok(attempt),
            Err(e) => {
                tracing::debug!(
                    peer = endpoint,
                    record = record.kind(),
                    attempt,
                    "Forward attempt failed: {}",
                    e
                );
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ForwardError::Unreachable {
        endpoint: endpoint.to_string(),
        reason: "no attempt made".to_string(),
    }))
}

/// Deliver a record to every peer concurrently
pub async fn fan_out(
    forwarder: &dyn SiteForwarder,
    peers: &[String],
    record: &ForwardRecord,
    policy: &ForwardPolicy,
) -> FanOutReport {
    let deliveries = peers.iter().map(|peer| async move {
        let result = deliver_with_retry(forwarder, peer, record, policy).await;
        (peer.clone(), result)
    });

    let mut report = FanOutReport::default();
    for (peer, result) in join_all(deliveries).await {
        match result {
            Ok(_) => report.delivered.push(peer),
            Err(e) => {
                tracing::warn!(
                    peer = %peer,
                    record = record.kind(),
                    key = %record.key(),
                    "Giving up forwarding after {} attempts: {}",
                    policy.attempts,
                    e
                );
                report.failed.push((peer, e));
            }
        }
    }
    report
}

/// Forwarder that writes straight into a peer site's Redis directories
///
/// The peer endpoint is the peer site's Redis URL; records land under the
/// same key layout a [`crate::store::RedisStore`] uses, and a notification
/// is published so the peer's subscribers observe the change.
pub struct RedisSiteForwarder {
    key_prefix: String,
    connections: Mutex<HashMap<String, MultiplexedConnection>>,
}

impl RedisSiteForwarder {
    pub fn new(key_prefix: &str) -> Self {
        Self {
            key_prefix: key_prefix.to_string(),
            connections: Mutex::new(HashMap::new()),
        }
    }

    async fn connection(&self, endpoint: &str) -> Result<MultiplexedConnection, ForwardError> {
        let mut connections = self.connections.lock().await;
        if let Some(conn) = connections.get(endpoint) {
            return Ok(conn.clone());
        }

        let unreachable = |e: redis::RedisError| ForwardError::Unreachable {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        };
        let client = Client::open(endpoint).map_err(unreachable)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unreachable)?;

        connections.insert(endpoint.to_string(), conn.clone());
        Ok(conn)
    }

    async fn write(
        &self,
        conn: &mut MultiplexedConnection,
        layout: &RedisStoreConfig,
        record: &ForwardRecord,
    ) -> redis::RedisResult<()> {
        let key = record.key();
        let (directory, value) = match record {
            ForwardRecord::Watchdog(entry) => (WATCHDOG_DIRECTORY, serde_json::to_string(entry)),
            ForwardRecord::Parcel(parcel) => (PARCEL_DIRECTORY, serde_json::to_string(parcel)),
        };
        let value = value.map_err(|e| {
            redis::RedisError::from((redis::ErrorKind::TypeError, "encode", e.to_string()))
        })?;

        let entry_key = layout.entry_key(directory, &key);
        let event = match record {
            ForwardRecord::Watchdog(_) => {
                let previous: Option<String> = redis::cmd("SET")
                    .arg(&entry_key)
                    .arg(&value)
                    .arg("GET")
                    .query_async(&mut *conn)
                    .await?;
                Some(match previous {
                    Some(_) => StoreEvent::modified(&key, &value),
                    None => StoreEvent::created(&key, &value),
                })
            }
            ForwardRecord::Parcel(_) => {
                let existing: Option<String> = redis::cmd("SET")
                    .arg(&entry_key)
                    .arg(&value)
                    .arg("NX")
                    .arg("GET")
                    .query_async(&mut *conn)
                    .await?;
                existing.is_none().then(|| StoreEvent::created(&key, &value))
            }
        };

        if let Some(event) = event {
            let payload = serde_json::to_string(&event).map_err(|e| {
                redis::RedisError::from((redis::ErrorKind::TypeError, "encode", e.to_string()))
            })?;
            conn.publish::<_, _, ()>(layout.events_channel(directory), payload)
                .await?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl SiteForwarder for RedisSiteForwarder {
    async fn forward(&self, endpoint: &str, record: &ForwardRecord) -> Result<(), ForwardError> {
        let mut conn = self.connection(endpoint).await?;
        let layout = RedisStoreConfig {
            url: endpoint.to_string(),
            key_prefix: self.key_prefix.clone(),
        };

        if let Err(e) = self.write(&mut conn, &layout, record).await {
            // Reconnect on the next attempt
            self.connections.lock().await.remove(endpoint);
            return Err(ForwardError::Rejected {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }
}
