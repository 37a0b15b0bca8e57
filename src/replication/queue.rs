use std::cmp::Ordering;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::warn;

use crate::state_machine::EntityKind;

/// A pending replication retry. Lives only in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryItem {
    pub entity_id: i64,
    /// Attempt number the retry will run as (0-based).
    pub attempt: u32,
    pub next_retry_at: Instant,
}

/// Due time used when `now + delay` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

impl RetryItem {
    pub fn after(entity_id: i64, attempt: u32, delay: Duration) -> Self {
        let now = Instant::now();
        Self {
            entity_id,
            attempt,
            next_retry_at: now.checked_add(delay).unwrap_or(now + FAR_FUTURE),
        }
    }
}

/// Producer side of the bounded retry queue.
///
/// Offers never wait: when the queue is full the item is shed.
#[derive(Debug, Clone)]
pub struct RetryQueue {
    kind: EntityKind,
    tx: mpsc::Sender<RetryItem>,
}

/// Create a bounded retry queue. A capacity of zero is raised to one.
pub fn retry_queue(kind: EntityKind, capacity: usize) -> (RetryQueue, mpsc::Receiver<RetryItem>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RetryQueue { kind, tx }, rx)
}

impl RetryQueue {
    /// Non-blocking enqueue. Returns `false` when the item was dropped.
    pub fn offer(&self, item: RetryItem) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(item)) => {
                warn!(
                    kind = %self.kind,
                    entity_id = item.entity_id,
                    attempt = item.attempt,
                    capacity = self.tx.max_capacity(),
                    "retry queue full; retry dropped"
                );
                false
            }
            Err(TrySendError::Closed(item)) => {
                warn!(
                    kind = %self.kind,
                    entity_id = item.entity_id,
                    "retry worker stopped; retry dropped"
                );
                false
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

/// Heap entry ordering retries by due time, then by arrival.
#[derive(Debug)]
pub(crate) struct Scheduled {
    pub(crate) item: RetryItem,
    pub(crate) seq: u64,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.item
            .next_retry_at
            .cmp(&other.item.next_retry_at)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}
