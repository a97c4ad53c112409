//! Deadline monitoring
//!
//! Every cluster member receives every parcel-creation notification and
//! schedules a one-shot timer for it. When a timer fires and the parcel is
//! still stored without an outcome, the coordinator evaluates failover.
//! Timers are never cancelled; a parcel that finished in time is simply
//! observed as processed when its timer fires.

mod deadline;

pub use deadline::{DeadlineConfig, DeadlineMonitor};
