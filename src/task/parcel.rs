//! Parcel record and its lifecycle state
//!
//! A Parcel is the durable, cluster-replicated record of one WUP's attempt
//! at one UoW. Its identifier is the UoW identifier plus a fixed trailing
//! component, so every caller registering the same UoW computes the same
//! store key.

use crate::error::{RecordError, RecordResult};
use crate::identity::Identifier;
use crate::task::uow::{ProcessingOutcome, UnitOfWork};
use crate::task::watchdog::{ComponentStatus, WupWatchdogState};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Trailing component appended to a UoW identity to name its parcel
pub const PARCEL_COMPONENT: &str = "parcel";

/// Value of the trailing parcel component
pub const PARCEL_COMPONENT_VALUE: &str = "primary";

/// Lifecycle status of a parcel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParcelStatus {
    /// Registered, nobody has started it
    Registered,
    /// A WUP is working on it
    Active,
    /// Work done, outcome recorded
    Finished,
    /// Terminal; ready for archival and removal
    Finalised,
    /// Marked as unable to complete; may be restarted
    Failed,
}

impl ParcelStatus {
    /// Whether no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, ParcelStatus::Finalised)
    }
}

impl fmt::Display for ParcelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParcelStatus::Registered => write!(f, "registered"),
            ParcelStatus::Active => write!(f, "active"),
            ParcelStatus::Finished => write!(f, "finished"),
            ParcelStatus::Finalised => write!(f, "finalised"),
            ParcelStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Registration metadata of a parcel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelRegistration {
    pub parcel_id: Identifier,
    /// WUP that won the registration
    pub registering_wup: Identifier,
    pub supporting_function: Identifier,
    pub instantiation_instant: DateTime<Utc>,
    pub expected_completion_instant: DateTime<Utc>,
    /// WUPs that registered interest
    pub registered_wups: BTreeSet<Identifier>,
    pub contained_uow: Identifier,
}

/// Tracked attempt by one WUP to process one UoW
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parcel {
    pub status: ParcelStatus,
    pub registration: ParcelRegistration,
    /// Snapshot of the UoW, replaced as work progresses
    pub uow: UnitOfWork,
    /// Append-only; see [`Parcel::add_successor`]
    successors: BTreeSet<Identifier>,
    pub watchdog: WupWatchdogState,
    pub precursor: Option<Identifier>,
}

impl Parcel {
    /// Parcel identifier derived from a UoW identity
    pub fn id_for(uow_id: &Identifier) -> Identifier {
        uow_id
            .child(PARCEL_COMPONENT, PARCEL_COMPONENT_VALUE)
            .expect("static parcel component name is valid")
    }

    /// Store key derived from a UoW identity
    pub fn key_for(uow_id: &Identifier) -> String {
        Self::id_for(uow_id).render()
    }

    /// Build a freshly REGISTERED parcel
    pub fn register(
        wup_id: Identifier,
        supporting_function: Identifier,
        uow: UnitOfWork,
        precursor: Option<Identifier>,
        now: DateTime<Utc>,
        expected_duration: chrono::Duration,
    ) -> Self {
        let parcel_id = Self::id_for(&uow.id);
        let mut registered_wups = BTreeSet::new();
        registered_wups.insert(wup_id.clone());

        Self {
            status: ParcelStatus::Registered,
            registration: ParcelRegistration {
                parcel_id,
                registering_wup: wup_id.clone(),
                supporting_function,
                instantiation_instant: now,
                expected_completion_instant: now + expected_duration,
                registered_wups,
                contained_uow: uow.id.clone(),
            },
            uow,
            successors: BTreeSet::new(),
            watchdog: WupWatchdogState::new(wup_id, ComponentStatus::Idle, now),
            precursor,
        }
    }

    /// Parcel identifier
    pub fn id(&self) -> &Identifier {
        &self.registration.parcel_id
    }

    /// Store key
    pub fn key(&self) -> String {
        self.registration.parcel_id.render()
    }

    /// Successor parcels, in identifier order
    pub fn successors(&self) -> &BTreeSet<Identifier> {
        &self.successors
    }

    /// Record a successor; returns false if already present
    pub fn add_successor(&mut self, successor: Identifier) -> bool {
        self.successors.insert(successor)
    }

    /// Claimed by a WUP
    pub fn mark_active(&mut self, now: DateTime<Utc>) {
        self.status = ParcelStatus::Active;
        self.watchdog.update(ComponentStatus::Active, now);
    }

    /// Work finished; releases the watchdog and records the outcome
    ///
    /// An owner flagged UNRESPONSIVE by a deadline check is reporting in, so
    /// it is released to IDLE as well.
    pub fn mark_finished(&mut self, finished: UnitOfWork, outcome: ProcessingOutcome, now: DateTime<Utc>) {
        if matches!(
            self.watchdog.status,
            ComponentStatus::Active | ComponentStatus::Unresponsive
        ) {
            self.watchdog.status = ComponentStatus::Idle;
        }
        self.watchdog.last_status_update = now;
        self.uow = UnitOfWork {
            outcome: Some(outcome),
            ..finished
        };
        self.status = ParcelStatus::Finished;
    }

    /// Terminal write before archival
    pub fn mark_finalised(&mut self) {
        self.status = ParcelStatus::Finalised;
    }

    /// Time between instantiation and expected completion
    pub fn expected_duration(&self) -> chrono::Duration {
        self.registration.expected_completion_instant - self.registration.instantiation_instant
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> RecordResult<String> {
        serde_json::to_string(self).map_err(|e| RecordError::Serialization(e.to_string()))
    }

    /// Deserialize from JSON stored under `key`
    pub fn from_json(key: &str, json: &str) -> RecordResult<Self> {
        serde_json::from_str(json).map_err(|e| RecordError::MalformedRecord {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}
