//! Best-effort replication of committed records to the mirror.
//!
//! A committed change spawns one detached attempt. Failed attempts are
//! rescheduled with exponential backoff on a per-kind [`RetryWorker`] until
//! the budget in [`BackoffPolicy`] runs out, after which the failure is
//! logged and the chain ends. The authoritative store is never affected.

mod backoff;
mod outstanding;
mod queue;
mod replicator;
mod sync;
mod worker;

pub use backoff::{BackoffPolicy, MAX_ATTEMPTS};
pub use queue::{RetryItem, RetryQueue, retry_queue};
pub use replicator::{AttemptOutcome, Replicator};
pub use sync::ReplicationSync;
pub use worker::RetryWorker;
