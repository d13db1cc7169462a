//! Counter actor port.

use async_trait::async_trait;

use crate::domain::{
    CooldownDecision, CounterOp, CounterReply, CounterSnapshot, WindowDecision,
};
use crate::error::CounterError;

/// Counter actor trait - abstraction over how a key's counter is reached.
///
/// Every implementation must apply calls for the same key one at a time, in
/// arrival order. Calls for different keys are independent.
#[async_trait]
pub trait CounterActor: Send + Sync {
    /// Send one operation to the actor addressed by `key`.
    async fn call(&self, key: &str, op: CounterOp) -> Result<CounterReply, CounterError>;

    async fn increment_window(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> Result<WindowDecision, CounterError> {
        let op = CounterOp::IncrementWindow {
            limit,
            window_seconds,
        };
        match self.call(key, op).await? {
            CounterReply::Window(decision) => Ok(decision),
            other => Err(mismatched(&op, &other)),
        }
    }

    async fn check_cooldown(
        &self,
        key: &str,
        cooldown_seconds: i64,
    ) -> Result<CooldownDecision, CounterError> {
        let op = CounterOp::CheckCooldown { cooldown_seconds };
        match self.call(key, op).await? {
            CounterReply::Cooldown(decision) => Ok(decision),
            other => Err(mismatched(&op, &other)),
        }
    }

    async fn peek(&self, key: &str) -> Result<CounterSnapshot, CounterError> {
        let op = CounterOp::Peek;
        match self.call(key, op).await? {
            CounterReply::Snapshot(snapshot) => Ok(snapshot),
            other => Err(mismatched(&op, &other)),
        }
    }

    async fn increment_fixed_expiry(
        &self,
        key: &str,
        expires_at: i64,
    ) -> Result<CounterSnapshot, CounterError> {
        let op = CounterOp::IncrementFixedExpiry { expires_at };
        match self.call(key, op).await? {
            CounterReply::Snapshot(snapshot) => Ok(snapshot),
            other => Err(mismatched(&op, &other)),
        }
    }
}

fn mismatched(op: &CounterOp, reply: &CounterReply) -> CounterError {
    CounterError::Transport(format!("unexpected reply to {}: {:?}", op.name(), reply))
}
