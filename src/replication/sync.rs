use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::mirror::{Mirror, MirrorError};
use crate::state_machine::{Payload, Record};

/// Writes record projections to the mirror under one domain.
#[derive(Clone)]
pub struct ReplicationSync {
    mirror: Arc<dyn Mirror>,
    domain: String,
    push_timeout: Duration,
}

impl ReplicationSync {
    pub fn new(mirror: Arc<dyn Mirror>, domain: impl Into<String>, push_timeout: Duration) -> Self {
        Self {
            mirror,
            domain: domain.into(),
            push_timeout,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Push the current snapshot of `record`. Idempotent; a timeout counts
    /// as a failure.
    pub async fn push<P: Payload>(&self, record: &Record<P>) -> Result<(), MirrorError> {
        let path = record.mirror_key(&self.domain);
        let fields = record.projection(Utc::now());
        match tokio::time::timeout(self.push_timeout, self.mirror.put(&path, &fields)).await {
            Ok(result) => result,
            Err(_) => Err(MirrorError::Timeout(self.push_timeout)),
        }
    }
}
