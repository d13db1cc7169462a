use async_trait::async_trait;

use crate::domain::CounterState;
use crate::error::CounterError;

/// Storage trait - where a counter actor persists its one state value.
///
/// Failures must surface as `CounterError::Storage`; an unreadable state is
/// never reported as absent.
#[async_trait]
pub trait CounterStorage: Send + Sync {
    /// Load the stored state for a key, live or not.
    async fn load(&self, key: &str) -> Result<Option<CounterState>, CounterError>;

    /// Replace the stored state for a key.
    async fn save(&self, key: &str, state: &CounterState) -> Result<(), CounterError>;

    /// Remove the stored state for a key.
    async fn delete(&self, key: &str) -> Result<(), CounterError>;

    /// Drop every state that expired at or before `now`. Returns how many went.
    async fn purge_expired(&self, now: i64) -> Result<usize, CounterError>;
}
