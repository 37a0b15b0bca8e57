//! Secondary real-time store ("mirror") consumed by live dashboards.
//!
//! The mirror is best effort: writes overwrite a whole path, there are no
//! transactions, and a failed write never affects the authoritative store.

pub mod client;
pub mod error;
pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use client::RealtimeDbClient;
pub use error::MirrorError;
pub use memory::MemoryMirror;

/// Write access to a hierarchical key/value mirror.
#[async_trait]
pub trait Mirror: Send + Sync {
    /// Replace the value stored at `path` with `fields`.
    async fn put(&self, path: &str, fields: &Map<String, Value>) -> Result<(), MirrorError>;
}
