//! parcel-mesh - Control plane for a distributed workflow mesh
//!
//! Work unit processors (WUPs) spread across pods and sites agree on who
//! processes each unit of work (UoW) through a replicated store. Every UoW
//! gets exactly one *parcel*, a record of its processing status that any
//! cluster member can read.
//!
//! # Features
//!
//! - **Idempotent registration**: racing registrations of the same UoW
//!   converge on a single parcel via insert-if-absent.
//!
//! - **Claims and takeover**: a WUP claims a parcel before working on it;
//!   failed or unresponsive owners can be replaced.
//!
//! - **Liveness**: nodes and WUPs publish status into a watchdog directory;
//!   peer WUPs translate it into CONTINUE / PAUSE / HALT suggestions.
//!
//! - **Deadlines**: every member times every parcel and flags owners that
//!   overrun, making the parcel available to others.
//!
//! - **Cross-site fan-out**: registrations and status changes are pushed to
//!   peer sites with a bounded retry budget.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐  ┌───────────┐            ┌───────────┐
//! │   WUP 1   │  │   WUP 2   │    ...     │   WUP N   │
//! └─────┬─────┘  └─────┬─────┘            └─────┬─────┘
//!       │ register / start / finish / finalise  │
//!       ▼              ▼                        ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                    ParcelAgent                       │
//! └──────────────────────────┬──────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                  NodeCoordinator                     │
//! │  heartbeat loop ─ watchdog ─ multicast ─ capability  │
//! └───────┬──────────────────┬───────────────────┬──────┘
//!         │                  │                   │ fan-out (3 attempts)
//!         ▼                  ▼                   ▼
//! ┌───────────────┐  ┌───────────────┐   ┌───────────────┐
//! │ Replicated    │  │ Deadline      │   │  Peer sites   │
//! │ store (Redis) │─▶│ monitor       │   │  (Redis)      │
//! └───────────────┘  └───────────────┘   └───────────────┘
//!                    creation events
//! ```
//!
//! # Example
//!
//! ```bash
//! # Run a node
//! parcel-mesh node --site site-a --peer redis://site-b:6379
//!
//! # Inspect parcels
//! parcel-mesh parcels --function function=ingest --format json
//! ```

pub mod agent;
pub mod archive;
pub mod config;
pub mod error;
pub mod identity;
pub mod monitor;
pub mod node;
pub mod store;
pub mod task;

pub use agent::ParcelAgent;
pub use config::{CliArgs, NodeConfig};
pub use error::{MeshError, Result};
pub use identity::Identifier;
pub use monitor::DeadlineMonitor;
pub use node::NodeCoordinator;
pub use task::{ActionSuggestion, Parcel, ParcelStatus};
