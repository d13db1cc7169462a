//! In-process counter actors: one task per key.
//!
//! Each key gets a task that owns the key's state and drains an unbounded
//! mailbox one operation at a time, so calls for a key can never interleave.
//! Mailboxes live in a `DashMap`. A message is only ever pushed while holding
//! the key's map shard, and an idle actor only retires by removing its own
//! entry under that same shard with an empty mailbox. A retiring actor
//! therefore never has work left, and at most one actor per key runs at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use folio_core::domain::{CounterOp, CounterReply, CounterState, StateWrite};
use folio_core::error::CounterError;
use folio_core::ports::{Clock, CounterActor, CounterStorage, SystemClock};

/// In-process actor configuration.
#[derive(Debug, Clone)]
pub struct LocalActorConfig {
    /// How long an actor waits for work before retiring.
    pub idle_timeout: Duration,
}

impl Default for LocalActorConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl LocalActorConfig {
    pub fn from_env() -> Self {
        Self {
            idle_timeout: Duration::from_secs(
                std::env::var("ACTOR_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|secs: &u64| *secs > 0)
                    .unwrap_or(300),
            ),
        }
    }
}

type Reply = Result<CounterReply, CounterError>;

struct Envelope {
    op: CounterOp,
    reply: oneshot::Sender<Reply>,
}

struct Mailbox {
    generation: u64,
    sender: mpsc::UnboundedSender<Envelope>,
}

type Registry = Arc<DashMap<String, Mailbox>>;

/// Routes each call to the actor owning its key, spawning actors on demand.
pub struct LocalCounterActors {
    registry: Registry,
    storage: Arc<dyn CounterStorage>,
    clock: Arc<dyn Clock>,
    config: LocalActorConfig,
    generations: AtomicU64,
}

impl LocalCounterActors {
    pub fn new(storage: Arc<dyn CounterStorage>, config: LocalActorConfig) -> Self {
        Self::with_clock(storage, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        storage: Arc<dyn CounterStorage>,
        clock: Arc<dyn Clock>,
        config: LocalActorConfig,
    ) -> Self {
        Self {
            registry: Arc::new(DashMap::new()),
            storage,
            clock,
            config,
            generations: AtomicU64::new(0),
        }
    }

    /// Number of actors currently running.
    pub fn live_actors(&self) -> usize {
        self.registry.len()
    }

    fn spawn(&self, key: &str) -> Mailbox {
        let (sender, receiver) = mpsc::unbounded_channel();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        let actor = KeyActor {
            key: key.to_string(),
            generation,
            state: None,
            storage: self.storage.clone(),
            clock: self.clock.clone(),
            registry: self.registry.clone(),
            idle_timeout: self.config.idle_timeout,
        };
        tokio::spawn(actor.run(receiver));

        Mailbox { generation, sender }
    }

    /// Push an envelope into the key's mailbox, spawning the actor if needed.
    ///
    /// On failure hands the envelope back along with the dead mailbox's generation.
    fn deliver(&self, key: &str, envelope: Envelope) -> Result<(), (Envelope, u64)> {
        let mailbox = self
            .registry
            .entry(key.to_string())
            .or_insert_with(|| self.spawn(key));

        mailbox
            .sender
            .send(envelope)
            .map_err(|mpsc::error::SendError(envelope)| (envelope, mailbox.generation))
    }
}

#[async_trait]
impl CounterActor for LocalCounterActors {
    async fn call(&self, key: &str, op: CounterOp) -> Result<CounterReply, CounterError> {
        op.validate()?;

        let (reply, response) = oneshot::channel();
        let mut envelope = Envelope { op, reply };

        // A mailbox whose task died (panicked) is replaced once.
        for attempt in 0..2 {
            match self.deliver(key, envelope) {
                Ok(()) => {
                    return response.await.map_err(|_| {
                        CounterError::Transport(format!("actor for {key} dropped the call"))
                    })?;
                }
                Err((returned, generation)) => {
                    tracing::warn!(key = %key, attempt, "Counter actor mailbox closed, respawning");
                    self.registry
                        .remove_if(key, |_, mailbox| mailbox.generation == generation);
                    envelope = returned;
                }
            }
        }

        Err(CounterError::Transport(format!(
            "actor for {key} is not accepting calls"
        )))
    }
}

/// The task that owns one key.
struct KeyActor {
    key: String,
    generation: u64,
    /// `None` until the state has been loaded from storage.
    state: Option<Option<CounterState>>,
    storage: Arc<dyn CounterStorage>,
    clock: Arc<dyn Clock>,
    registry: Registry,
    idle_timeout: Duration,
}

impl KeyActor {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Envelope>) {
        tracing::debug!(key = %self.key, generation = self.generation, "Counter actor started");

        loop {
            match tokio::time::timeout(self.idle_timeout, receiver.recv()).await {
                Ok(Some(envelope)) => {
                    let result = self.handle(envelope.op).await;
                    if let Err(e) = &result {
                        tracing::warn!(key = %self.key, op = envelope.op.name(), error = %e, "Counter operation failed");
                    }
                    // The caller may have given up; nothing to do then.
                    let _ = envelope.reply.send(result);
                }
                Ok(None) => break,
                Err(_) => {
                    let generation = self.generation;
                    let retired = self
                        .registry
                        .remove_if(&self.key, |_, mailbox| {
                            mailbox.generation == generation && receiver.is_empty()
                        })
                        .is_some();
                    if retired {
                        break;
                    }
                }
            }
        }

        tracing::debug!(key = %self.key, generation = self.generation, "Counter actor retired");
    }

    async fn handle(&mut self, op: CounterOp) -> Result<CounterReply, CounterError> {
        let current = match self.state {
            Some(state) => state,
            None => {
                let loaded = self.storage.load(&self.key).await?;
                self.state = Some(loaded);
                loaded
            }
        };

        let transition = op.apply(current, self.clock.now())?;

        // Persist first; memory only moves once storage has accepted the write.
        match transition.write {
            StateWrite::Unchanged => {}
            StateWrite::Put(state) => self.storage.save(&self.key, &state).await?,
            StateWrite::Delete => self.storage.delete(&self.key).await?,
        }
        self.state = Some(transition.write.resolve(current));

        Ok(transition.reply)
    }
}
