//! Delivery lifecycle tracking with best-effort real-time mirroring.
//!
//! Status changes of deliveries and ompreng cleanings are validated against a
//! stage graph, committed atomically to SQLite together with an audit row,
//! and then replicated to a realtime mirror in the background with bounded
//! exponential backoff.

pub mod config;
pub mod error;
pub mod mirror;
pub mod replication;
pub mod service;
pub mod state_machine;
pub mod store;

pub use error::{LintasError, Result};
pub use service::{ReplicationSettings, ResyncReport, ShutdownReport, TransitionService};
