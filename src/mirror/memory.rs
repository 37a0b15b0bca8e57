use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::Mirror;
use super::error::MirrorError;

/// In-process mirror. Used when no realtime database is configured.
#[derive(Default)]
pub struct MemoryMirror {
    nodes: Mutex<BTreeMap<String, Map<String, Value>>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Map<String, Value>> {
        self.lock().get(path.trim_matches('/')).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored path with its current value, in path order.
    pub fn snapshot(&self) -> BTreeMap<String, Map<String, Value>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Map<String, Value>>> {
        // A poisoned map is still a valid map.
        self.nodes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Mirror for MemoryMirror {
    async fn put(&self, path: &str, fields: &Map<String, Value>) -> Result<(), MirrorError> {
        self.lock()
            .insert(path.trim_matches('/').to_string(), fields.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_overwrites_whole_node() {
        let mirror = MemoryMirror::new();
        let mut first = Map::new();
        first.insert("status".into(), "cooking".into());
        first.insert("note".into(), "hot".into());
        mirror.put("d/2026-10-18/delivery_1", &first).await.unwrap();

        let mut second = Map::new();
        second.insert("status".into(), "cooked".into());
        mirror.put("/d/2026-10-18/delivery_1", &second).await.unwrap();

        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.get("d/2026-10-18/delivery_1"), Some(second));
    }
}
