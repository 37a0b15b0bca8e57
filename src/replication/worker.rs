use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::{RetryItem, Scheduled};
use super::replicator::Replicator;
use crate::state_machine::Payload;

/// Single consumer of retries for one entity kind.
///
/// Items arrive from the bounded [`RetryQueue`](super::RetryQueue) and from
/// the replicator's in-process schedule, and wait in a heap keyed by
/// `next_retry_at`. When the earliest item is due the worker hands it back to
/// the replicator, which reloads the record and attempts again.
pub struct RetryWorker<P: Payload> {
    replicator: Arc<Replicator<P>>,
    queue: mpsc::Receiver<RetryItem>,
    schedule: mpsc::UnboundedReceiver<RetryItem>,
    pending: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
    cancel: CancellationToken,
}

impl<P: Payload> RetryWorker<P> {
    pub(crate) fn new(
        replicator: Arc<Replicator<P>>,
        queue: mpsc::Receiver<RetryItem>,
        schedule: mpsc::UnboundedReceiver<RetryItem>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            replicator,
            queue,
            schedule,
            pending: BinaryHeap::new(),
            next_seq: 0,
            cancel,
        }
    }

    /// Run until cancelled. Returns the number of retries abandoned at stop.
    pub async fn run(mut self) -> usize {
        info!(kind = %P::KIND, "retry worker started");

        loop {
            let next_due = self.pending.peek().map(|Reverse(s)| s.item.next_retry_at);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(item) = self.queue.recv() => self.push(item),
                Some(item) = self.schedule.recv() => self.push(item),
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    self.fire_due();
                }
                else => break,
            }
        }

        let abandoned = self.abandon();
        if abandoned > 0 {
            warn!(kind = %P::KIND, abandoned, "retry worker stopped with pending retries");
        } else {
            info!(kind = %P::KIND, "retry worker stopped");
        }
        abandoned
    }

    fn push(&mut self, item: RetryItem) {
        debug!(
            kind = %P::KIND,
            entity_id = item.entity_id,
            attempt = item.attempt,
            "retry scheduled on worker"
        );
        self.pending.push(Reverse(Scheduled {
            item,
            seq: self.next_seq,
        }));
        self.next_seq += 1;
    }

    fn fire_due(&mut self) {
        let now = Instant::now();
        while self
            .pending
            .peek()
            .is_some_and(|Reverse(s)| s.item.next_retry_at <= now)
        {
            if let Some(Reverse(due)) = self.pending.pop() {
                self.replicator.fire(due.item);
            }
        }
    }

    fn abandon(&mut self) -> usize {
        let mut abandoned = self.pending.len();
        self.pending.clear();
        while self.queue.try_recv().is_ok() {
            abandoned += 1;
        }
        while self.schedule.try_recv().is_ok() {
            abandoned += 1;
        }
        self.replicator.release(abandoned);
        abandoned
    }

    /// Retries waiting in the heap.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::MemoryMirror;
    use crate::replication::testing::{eventually, memory_store, seed_delivery};
    use crate::replication::{BackoffPolicy, ReplicationSync};
    use crate::state_machine::{DeliveryPayload, StageGraph};
    use std::time::Duration;

    #[tokio::test]
    async fn queued_retry_replicates_latest_state() {
        let store = memory_store().await;
        let record = seed_delivery(&store).await;
        let mirror = Arc::new(MemoryMirror::new());
        let sync = ReplicationSync::new(mirror.clone(), "delivery_monitoring", Duration::from_secs(1));
        let (replicator, worker) = Replicator::<DeliveryPayload>::new(
            store.clone(),
            sync,
            BackoffPolicy::new(Duration::from_millis(5), 5),
            8,
        );
        tokio::spawn(worker.run());

        assert!(replicator.queue_for_retry(record.id, 0));
        // Changed after enqueue: the worker must push this state, not the old one.
        store
            .commit_transition::<DeliveryPayload>(&StageGraph::delivery(), record.id, "cooked", "chef", "")
            .await
            .unwrap();

        let key = record.mirror_key("delivery_monitoring");
        eventually(|| mirror.get(&key).is_some()).await;
        assert_eq!(mirror.get(&key).unwrap()["status"], "cooked");
    }

    #[tokio::test]
    async fn cancel_abandons_pending_retries() {
        let store = memory_store().await;
        let mirror = Arc::new(MemoryMirror::new());
        let sync = ReplicationSync::new(mirror.clone(), "delivery_monitoring", Duration::from_secs(1));
        let (replicator, worker) = Replicator::<DeliveryPayload>::new(
            store,
            sync,
            BackoffPolicy::new(Duration::from_secs(60), 5),
            8,
        );
        let handle = tokio::spawn(worker.run());

        assert!(replicator.queue_for_retry(1, 0));
        assert!(replicator.queue_for_retry(2, 3));

        assert!(!replicator.shutdown(Duration::from_millis(100)).await);
        let abandoned = handle.await.unwrap();
        assert_eq!(abandoned, 2);
        assert_eq!(replicator.outstanding(), 0);
        assert!(mirror.is_empty());
    }

    #[tokio::test]
    async fn fire_due_leaves_future_items() {
        let store = memory_store().await;
        let sync = ReplicationSync::new(
            Arc::new(MemoryMirror::new()),
            "delivery_monitoring",
            Duration::from_secs(1),
        );
        let (_replicator, mut worker) = Replicator::<DeliveryPayload>::new(
            store,
            sync,
            BackoffPolicy::default(),
            8,
        );

        worker.push(RetryItem::after(1, 1, Duration::ZERO));
        worker.push(RetryItem::after(2, 1, Duration::from_secs(60)));
        worker.fire_due();

        assert_eq!(worker.pending(), 1);
    }
}
