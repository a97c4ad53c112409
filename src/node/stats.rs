//! Node activity counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated from the heartbeat loop and fan-out paths
#[derive(Debug, Default)]
pub struct NodeStats {
    heartbeats: AtomicU64,
    forwards_delivered: AtomicU64,
    forwards_failed: AtomicU64,
    late_parcels: AtomicU64,
}

/// Point-in-time copy of [`NodeStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatsSnapshot {
    pub heartbeats: u64,
    pub forwards_delivered: u64,
    pub forwards_failed: u64,
    pub late_parcels: u64,
}

impl NodeStats {
    pub fn record_heartbeat(&self) {
        self.heartbeats.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwards(&self, delivered: usize, failed: usize) {
        self.forwards_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.forwards_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn record_late_parcel(&self) {
        self.late_parcels.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> NodeStatsSnapshot {
        NodeStatsSnapshot {
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            forwards_delivered: self.forwards_delivered.load(Ordering::Relaxed),
            forwards_failed: self.forwards_failed.load(Ordering::Relaxed),
            late_parcels: self.late_parcels.load(Ordering::Relaxed),
        }
    }
}
