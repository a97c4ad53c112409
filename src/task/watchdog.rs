//! Liveness records and action suggestions

use crate::identity::Identifier;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Liveness status of a WUP or node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentStatus {
    /// Registered, not working on anything
    Idle,
    /// Working on a parcel
    Active,
    /// Missed its deadline or heartbeat
    Unresponsive,
    /// Reported it cannot complete
    Failed,
}

impl ComponentStatus {
    /// Whether a peer may take over work owned by a component in this state
    pub fn allows_takeover(&self) -> bool {
        matches!(self, ComponentStatus::Failed | ComponentStatus::Unresponsive)
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentStatus::Idle => write!(f, "idle"),
            ComponentStatus::Active => write!(f, "active"),
            ComponentStatus::Unresponsive => write!(f, "unresponsive"),
            ComponentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What a WUP should do after a lifecycle call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionSuggestion {
    /// Proceed with the work
    Continue,
    /// Someone else owns it; wait and poll again
    Pause,
    /// Stop; the work is done or retired
    Halt,
}

impl fmt::Display for ActionSuggestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionSuggestion::Continue => write!(f, "continue"),
            ActionSuggestion::Pause => write!(f, "pause"),
            ActionSuggestion::Halt => write!(f, "halt"),
        }
    }
}

/// Task-processor state embedded in a parcel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WupWatchdogState {
    pub wup_id: Identifier,
    pub status: ComponentStatus,
    pub last_status_update: DateTime<Utc>,
}

impl WupWatchdogState {
    pub fn new(wup_id: Identifier, status: ComponentStatus, at: DateTime<Utc>) -> Self {
        Self {
            wup_id,
            status,
            last_status_update: at,
        }
    }

    /// Set status and stamp the update instant
    pub fn update(&mut self, status: ComponentStatus, at: DateTime<Utc>) {
        self.status = status;
        self.last_status_update = at;
    }
}

/// Per-component entry in the watchdog directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchdogEntry {
    /// WUP or node identity; also the directory key
    pub component_id: Identifier,
    pub status: ComponentStatus,
    pub last_status_update: DateTime<Utc>,
    /// Set for WUPs only
    pub supported_function: Option<Identifier>,
    /// Parcel the WUP is currently working on
    pub current_parcel: Option<Identifier>,
}

impl WatchdogEntry {
    /// Fresh IDLE entry for a WUP
    pub fn for_wup(wup_id: Identifier, supported_function: Identifier, at: DateTime<Utc>) -> Self {
        Self {
            component_id: wup_id,
            status: ComponentStatus::Idle,
            last_status_update: at,
            supported_function: Some(supported_function),
            current_parcel: None,
        }
    }

    /// Entry for a node heartbeat
    pub fn for_node(node_id: Identifier, status: ComponentStatus, at: DateTime<Utc>) -> Self {
        Self {
            component_id: node_id,
            status,
            last_status_update: at,
            supported_function: None,
            current_parcel: None,
        }
    }

    /// Directory key
    pub fn key(&self) -> String {
        self.component_id.render()
    }

    /// Seconds since the last update, relative to `now`
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_status_update).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_takeover_statuses() {
        assert!(ComponentStatus::Failed.allows_takeover());
        assert!(ComponentStatus::Unresponsive.allows_takeover());
        assert!(!ComponentStatus::Active.allows_takeover());
        assert!(!ComponentStatus::Idle.allows_takeover());
    }

    #[test]
    fn test_wup_entry_defaults() {
        let now = Utc::now();
        let entry = WatchdogEntry::for_wup(
            Identifier::parse("wup=wup-1").unwrap(),
            Identifier::parse("function=ingest").unwrap(),
            now,
        );
        assert_eq!(entry.status, ComponentStatus::Idle);
        assert_eq!(entry.key(), "wup=wup-1");
        assert_eq!(entry.age_secs(now + chrono::Duration::seconds(5)), 5);
        assert!(entry.current_parcel.is_none());
    }
}
