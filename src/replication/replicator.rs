use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use super::backoff::BackoffPolicy;
use super::outstanding::Outstanding;
use super::queue::{RetryItem, RetryQueue, retry_queue};
use super::sync::ReplicationSync;
use super::worker::RetryWorker;
use crate::error::LintasError;
use crate::state_machine::{Payload, Record};
use crate::store::Store;

/// Where a replication attempt left its chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The mirror holds the pushed snapshot.
    Replicated,
    /// The push failed; `next_attempt` will run after `delay`.
    Scheduled { next_attempt: u32, delay: Duration },
    /// The push failed and the retry budget is spent.
    Exhausted,
    /// The chain ended without a push: the record is gone or the worker stopped.
    Dropped,
}

/// Best-effort replication of one entity kind to the mirror.
///
/// Attempts run as detached tasks; failures are rescheduled on the
/// [`RetryWorker`]'s timer heap and never reported to the caller that
/// committed the change.
pub struct Replicator<P: Payload> {
    store: Store,
    sync: ReplicationSync,
    backoff: BackoffPolicy,
    queue: RetryQueue,
    schedule: mpsc::UnboundedSender<RetryItem>,
    tracker: TaskTracker,
    outstanding: Outstanding,
    cancel: CancellationToken,
    _payload: PhantomData<fn() -> P>,
}

impl<P: Payload> Replicator<P> {
    /// Build a replicator and its (not yet running) retry worker.
    pub fn new(
        store: Store,
        sync: ReplicationSync,
        backoff: BackoffPolicy,
        queue_capacity: usize,
    ) -> (Arc<Self>, RetryWorker<P>) {
        let (queue, queue_rx) = retry_queue(P::KIND, queue_capacity);
        let (schedule, schedule_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let replicator = Arc::new(Self {
            store,
            sync,
            backoff,
            queue,
            schedule,
            tracker: TaskTracker::new(),
            outstanding: Outstanding::default(),
            cancel: cancel.clone(),
            _payload: PhantomData,
        });
        let worker = RetryWorker::new(Arc::clone(&replicator), queue_rx, schedule_rx, cancel);
        (replicator, worker)
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Run `attempt_with_retry` in a detached, tracked task.
    pub fn spawn_attempt(self: &Arc<Self>, record: Record<P>, attempt: u32) {
        self.outstanding.add();
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            this.attempt_with_retry(record, attempt).await;
            this.outstanding.done(1);
        });
    }

    /// Push `record`; on failure schedule the next attempt or give up.
    pub async fn attempt_with_retry(&self, record: Record<P>, attempt: u32) -> AttemptOutcome {
        match self.sync.push(&record).await {
            Ok(()) => {
                debug!(
                    kind = %P::KIND,
                    entity_id = record.id,
                    attempt,
                    status = %record.status,
                    "replicated to mirror"
                );
                AttemptOutcome::Replicated
            }
            Err(err) => self.after_failure(record.id, attempt, &err.to_string()),
        }
    }

    fn after_failure(&self, entity_id: i64, attempt: u32, reason: &str) -> AttemptOutcome {
        if !self.backoff.should_retry(attempt) {
            error!(
                kind = %P::KIND,
                entity_id,
                attempts = attempt + 1,
                reason,
                "replication abandoned after exhausting retries"
            );
            return AttemptOutcome::Exhausted;
        }

        let delay = self.backoff.delay_for(attempt);
        self.outstanding.add();
        if self
            .schedule
            .send(RetryItem::after(entity_id, attempt + 1, delay))
            .is_err()
        {
            self.outstanding.done(1);
            warn!(kind = %P::KIND, entity_id, attempt, "retry worker stopped; retry abandoned");
            return AttemptOutcome::Dropped;
        }

        warn!(
            kind = %P::KIND,
            entity_id,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            reason,
            "replication failed; retry scheduled"
        );
        AttemptOutcome::Scheduled {
            next_attempt: attempt + 1,
            delay,
        }
    }

    /// Queue a retry for `entity_id` on the bounded queue without waiting.
    /// Returns `false` when the queue was full and the retry was shed.
    pub fn queue_for_retry(&self, entity_id: i64, attempt: u32) -> bool {
        let delay = self.backoff.delay_for(attempt);
        self.outstanding.add();
        let queued = self.queue.offer(RetryItem::after(entity_id, attempt, delay));
        if !queued {
            self.outstanding.done(1);
        }
        queued
    }

    /// Fire a due retry: reload the latest state, then attempt.
    pub(crate) fn fire(self: &Arc<Self>, item: RetryItem) {
        self.outstanding.add();
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            this.retry(item).await;
            this.outstanding.done(1);
        });
        self.outstanding.done(1);
    }

    /// Forget retries the worker dropped without firing.
    pub(crate) fn release(&self, retries: usize) {
        self.outstanding.done(retries);
    }

    async fn retry(&self, item: RetryItem) -> AttemptOutcome {
        match self.store.lookup::<P>(item.entity_id).await {
            Ok(record) => self.attempt_with_retry(record, item.attempt).await,
            Err(LintasError::NotFound { .. }) => {
                warn!(kind = %P::KIND, entity_id = item.entity_id, "record vanished; retry dropped");
                AttemptOutcome::Dropped
            }
            Err(err) => self.after_failure(item.entity_id, item.attempt, &err.to_string()),
        }
    }

    /// Attempts currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Running attempts plus retries not yet fired.
    pub fn outstanding(&self) -> usize {
        self.outstanding.get()
    }

    /// Wait up to `grace` until every attempt has finished and no retry is
    /// waiting, then stop the retry worker. Returns `true` if that happened
    /// in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let drained = tokio::time::timeout(grace, async {
            self.outstanding.wait_idle().await;
            self.tracker.close();
            self.tracker.wait().await;
        })
        .await
        .is_ok();
        self.stop();
        drained
    }

    /// Stop the retry worker without waiting.
    pub fn stop(&self) {
        self.tracker.close();
        self.cancel.cancel();
    }
}
