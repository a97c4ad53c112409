//! Node-level coordination
//!
//! The coordinator provides:
//! - Ownership of the parcel, watchdog, multicast and capability directories
//! - Locally serialized appends to the multi-value directories
//! - Best-effort fan-out of watchdog entries and registrations to peer sites
//! - The node heartbeat loop
//! - Failover evaluation for parcels that overran their deadline

mod coordinator;
mod directories;
mod forward;
mod stats;

pub use coordinator::{CoordinatorConfig, LateParcelDecision, NodeCoordinator};
pub use directories::{Directories, MemberSet};
pub use forward::{
    deliver_with_retry, fan_out, FanOutReport, ForwardPolicy, ForwardRecord, RedisSiteForwarder,
    SiteForwarder, MAX_FORWARD_ATTEMPTS,
};
pub use stats::{NodeStats, NodeStatsSnapshot};
