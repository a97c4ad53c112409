//! WUP-facing parcel lifecycle protocol
//!
//! A WUP drives its work through a poll/act loop:
//!
//! 1. `register_work_unit_processor` once at startup
//! 2. `register_activity` for each UoW; racing callers converge on one parcel
//! 3. `start_activity` to claim; PAUSE means someone else owns it
//! 4. `finish_activity` and `finalise_activity` when done
//! 5. `get_peer_activity_status` while waiting on a peer's attempt
//!
//! Parcel status follows REGISTERED -> ACTIVE -> FINISHED -> FINALISED, with
//! FAILED reachable from ACTIVE and re-enterable into ACTIVE. Claims are a
//! plain read-then-write against the store: two nodes racing on the same
//! REGISTERED parcel can both be admitted.

mod engine;

pub use engine::{suggestion_for, AgentConfig, ParcelAgent, MAX_EXPECTED_DURATION};
