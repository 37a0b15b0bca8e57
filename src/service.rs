use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::mirror::Mirror;
use crate::replication::{BackoffPolicy, ReplicationSync, Replicator};
use crate::state_machine::{Payload, Record, StageGraph, StatusTransition};
use crate::store::Store;

/// Replication knobs for one entity kind.
#[derive(Debug, Clone)]
pub struct ReplicationSettings {
    pub domain: String,
    pub backoff: BackoffPolicy,
    pub queue_capacity: usize,
    pub push_timeout: Duration,
}

/// Counts from a resync request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResyncReport {
    pub queued: usize,
    pub dropped: usize,
}

/// What shutdown left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every running attempt finished within the grace period.
    pub drained: bool,
    /// Scheduled retries that were abandoned.
    pub abandoned: usize,
}

/// Entry point for status changes of one entity kind.
///
/// A request is validated and committed synchronously; replication to the
/// mirror happens afterwards in the background and its outcome is never
/// returned to the caller.
pub struct TransitionService<P: Payload> {
    graph: Arc<StageGraph>,
    store: Store,
    replicator: Arc<Replicator<P>>,
    worker: Option<JoinHandle<usize>>,
}

impl<P: Payload> TransitionService<P> {
    /// Wire the service and start its retry worker. Must be called inside a
    /// Tokio runtime.
    pub fn start(
        graph: StageGraph,
        store: Store,
        mirror: Arc<dyn Mirror>,
        settings: ReplicationSettings,
    ) -> Self {
        let sync = ReplicationSync::new(mirror, settings.domain, settings.push_timeout);
        let (replicator, worker) =
            Replicator::new(store.clone(), sync, settings.backoff, settings.queue_capacity);
        let worker = tokio::spawn(worker.run());

        Self {
            graph: Arc::new(graph),
            store,
            replicator,
            worker: Some(worker),
        }
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Validate and commit a status change, then replicate it in the background.
    pub async fn request_transition(
        &self,
        id: i64,
        new_status: &str,
        actor: &str,
        notes: &str,
    ) -> Result<Record<P>> {
        let span = info_span!(
            "transition",
            request_id = %Uuid::new_v4(),
            kind = %P::KIND,
            entity_id = id,
            to = new_status
        );

        async move {
            let (record, transition) = match self
                .store
                .commit_transition::<P>(&self.graph, id, new_status, actor, notes)
                .await
            {
                Ok(committed) => committed,
                Err(err) if err.is_rejection() => {
                    info!(%err, "transition rejected");
                    return Err(err);
                }
                Err(err) => {
                    error!(%err, "transition commit failed");
                    return Err(err);
                }
            };

            info!(
                from = %transition.from_status,
                actor,
                "transition committed"
            );
            self.replicator.spawn_attempt(record.clone(), 0);
            Ok(record)
        }
        .instrument(span)
        .await
    }

    /// Insert a new record at the first stage and mirror it.
    pub async fn register(&self, partition_date: NaiveDate, payload: P) -> Result<Record<P>> {
        let record = self
            .store
            .insert(self.graph.initial(), partition_date, &payload)
            .await?;
        info!(kind = %P::KIND, entity_id = record.id, status = %record.status, "record registered");
        self.replicator.spawn_attempt(record.clone(), 0);
        Ok(record)
    }

    pub async fn current(&self, id: i64) -> Result<Record<P>> {
        self.store.lookup(id).await
    }

    /// Transition log of `id`, oldest first. Unknown ids are `NotFound`.
    pub async fn history(&self, id: i64) -> Result<Vec<StatusTransition>> {
        self.store.lookup::<P>(id).await?;
        self.store.transitions(P::KIND, id).await
    }

    /// Ask the worker to replicate `id` again, without waiting.
    pub fn queue_for_retry(&self, id: i64, attempt: u32) -> bool {
        self.replicator.queue_for_retry(id, attempt)
    }

    /// Queue a fresh replication chain for every record of this kind,
    /// optionally only for one day. Records that do not fit in the queue are
    /// reported as dropped.
    pub async fn resync(&self, partition_date: Option<NaiveDate>) -> Result<ResyncReport> {
        let ids = self.store.list_ids(P::KIND, partition_date).await?;
        let mut report = ResyncReport::default();
        for id in ids {
            if self.queue_for_retry(id, 0) {
                report.queued += 1;
            } else {
                report.dropped += 1;
            }
        }
        if report.dropped > 0 {
            warn!(kind = %P::KIND, dropped = report.dropped, "resync exceeded retry queue capacity");
        }
        info!(kind = %P::KIND, queued = report.queued, "resync queued");
        Ok(report)
    }

    /// Wait up to `grace` for running attempts and scheduled retries, then
    /// stop the worker.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        let drained = self.replicator.shutdown(grace).await;
        let abandoned = match self.worker.take() {
            Some(worker) => match worker.await {
                Ok(abandoned) => abandoned,
                Err(err) => {
                    error!(kind = %P::KIND, %err, "retry worker panicked");
                    0
                }
            },
            None => 0,
        };
        ShutdownReport { drained, abandoned }
    }
}

impl<P: Payload> Drop for TransitionService<P> {
    fn drop(&mut self) {
        // The worker holds the replicator; without this it never exits.
        self.replicator.stop();
    }
}
