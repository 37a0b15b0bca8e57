use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Replication work not yet finished: running attempts plus retries waiting
/// on the worker. A retry is counted before it is handed over and released
/// only after the attempt it fires has been counted, so the count never
/// reads zero while a chain is still alive.
#[derive(Debug, Default)]
pub(crate) struct Outstanding {
    count: AtomicUsize,
    idle: Notify,
}

impl Outstanding {
    pub(crate) fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn done(&self, n: usize) {
        let update = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_sub(n)));
        let prev = match update {
            Ok(prev) | Err(prev) => prev,
        };
        if prev > 0 && prev <= n {
            self.idle.notify_waiters();
        }
    }

    pub(crate) fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Resolve once the count reaches zero.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.get() == 0 {
                return;
            }
            notified.await;
        }
    }
}
