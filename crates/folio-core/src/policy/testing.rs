//! Test doubles for the counter actor port.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{CounterOp, CounterReply, CounterState};
use crate::error::CounterError;
use crate::ports::{Clock, CounterActor, ManualClock};

/// Applies operations in place under one lock; records every key it is called with.
pub struct LocalActor {
    clock: Arc<ManualClock>,
    states: Mutex<HashMap<String, CounterState>>,
    pub calls: Mutex<Vec<String>>,
}

impl LocalActor {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            states: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn called_keys(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CounterActor for LocalActor {
    async fn call(&self, key: &str, op: CounterOp) -> Result<CounterReply, CounterError> {
        self.calls.lock().unwrap().push(key.to_string());

        let mut states = self.states.lock().unwrap();
        let current = states.get(key).copied();
        let transition = op.apply(current, self.clock.now())?;
        match transition.write.resolve(current) {
            Some(state) => states.insert(key.to_string(), state),
            None => states.remove(key),
        };
        Ok(transition.reply)
    }
}

/// Every call fails as if the actor were unreachable.
pub struct FailingActor;

#[async_trait]
impl CounterActor for FailingActor {
    async fn call(&self, _key: &str, _op: CounterOp) -> Result<CounterReply, CounterError> {
        Err(CounterError::Transport("connection refused".to_string()))
    }
}

/// Every call hangs forever.
pub struct StalledActor;

#[async_trait]
impl CounterActor for StalledActor {
    async fn call(&self, _key: &str, _op: CounterOp) -> Result<CounterReply, CounterError> {
        std::future::pending().await
    }
}

/// Fails only for keys containing `needle`; delegates the rest.
pub struct PartiallyFailingActor {
    pub inner: LocalActor,
    pub needle: &'static str,
}

#[async_trait]
impl CounterActor for PartiallyFailingActor {
    async fn call(&self, key: &str, op: CounterOp) -> Result<CounterReply, CounterError> {
        if key.contains(self.needle) {
            return Err(CounterError::Storage("disk full".to_string()));
        }
        self.inner.call(key, op).await
    }
}
