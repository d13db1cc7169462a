//! In-memory counter storage - used when Redis is not configured.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use folio_core::domain::CounterState;
use folio_core::error::CounterError;
use folio_core::ports::CounterStorage;

/// Counter states in a HashMap behind an async RwLock.
///
/// States survive an actor retiring but not a process restart.
pub struct InMemoryCounterStorage {
    store: RwLock<HashMap<String, CounterState>>,
}

impl InMemoryCounterStorage {
    pub fn new() -> Self {
        Self {
            store: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }
}

impl Default for InMemoryCounterStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStorage for InMemoryCounterStorage {
    async fn load(&self, key: &str) -> Result<Option<CounterState>, CounterError> {
        let store = self.store.read().await;
        Ok(store.get(key).copied())
    }

    async fn save(&self, key: &str, state: &CounterState) -> Result<(), CounterError> {
        let mut store = self.store.write().await;
        store.insert(key.to_string(), *state);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CounterError> {
        let mut store = self.store.write().await;
        store.remove(key);
        Ok(())
    }

    async fn purge_expired(&self, now: i64) -> Result<usize, CounterError> {
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|_, state| state.is_live(now));
        Ok(before - store.len())
    }
}
