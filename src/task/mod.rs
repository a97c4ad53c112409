//! Task model
//!
//! Plain value types shared by every part of the mesh:
//!
//! - [`UnitOfWork`]: the claimable piece of work, with its ingress payload
//!   and (once processed) its egress payload and outcome
//! - [`Parcel`]: one WUP's tracked attempt at one UoW, stored in the parcel
//!   directory under a key derived from the UoW identity
//! - [`WatchdogEntry`]: latest known liveness of a WUP or node
//! - [`ActionSuggestion`]: what a WUP should do next, returned by every
//!   lifecycle call
//!
//! Parcels reference precursors and successors by identifier only; the
//! chain is resolved through the store on demand.

mod parcel;
mod uow;
mod watchdog;

pub use parcel::{Parcel, ParcelRegistration, ParcelStatus, PARCEL_COMPONENT, PARCEL_COMPONENT_VALUE};
pub use uow::{ProcessingOutcome, UnitOfWork, DISCRIMINATOR_COMPONENT};
pub use watchdog::{ActionSuggestion, ComponentStatus, WatchdogEntry, WupWatchdogState};
