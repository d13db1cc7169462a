//! Counter state and the four counter operations.
//!
//! `CounterOp::apply` is the whole state machine: given the stored state and the
//! current time it yields the reply and the single write to persist. Actors and
//! storage backends only decide *where* the state lives and how calls for one
//! key are serialized.

use serde::{Deserialize, Serialize};

use crate::error::CounterError;

/// The one persisted value behind a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterState {
    pub count: u64,
    /// Unix seconds. The state is dead once `expires_at <= now`.
    pub expires_at: i64,
}

impl CounterState {
    pub fn new(count: u64, expires_at: i64) -> Self {
        Self { count, expires_at }
    }

    pub fn is_live(&self, now: i64) -> bool {
        self.expires_at > now
    }
}

/// An operation against one key's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CounterOp {
    /// Count one event in a window that starts at the first event.
    IncrementWindow { limit: i64, window_seconds: i64 },
    /// Allow once, then deny until the cooldown elapses.
    CheckCooldown { cooldown_seconds: i64 },
    /// Read the live state without changing it.
    Peek,
    /// Count one event against a caller-chosen absolute expiry.
    IncrementFixedExpiry { expires_at: i64 },
}

/// Reply to `IncrementWindow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowDecision {
    pub allowed: bool,
    pub remaining: u64,
    pub reset_at: i64,
    pub count: u64,
}

/// Reply to `CheckCooldown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownDecision {
    pub allowed: bool,
    pub remaining_seconds: i64,
}

/// Reply to `Peek` and `IncrementFixedExpiry`.
pub type CounterSnapshot = CounterState;

/// Reply to any counter operation. Serialized as the bare result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CounterReply {
    Window(WindowDecision),
    Cooldown(CooldownDecision),
    Snapshot(CounterSnapshot),
}

/// What the owner of the state must persist after an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateWrite {
    Unchanged,
    Put(CounterState),
    Delete,
}

impl StateWrite {
    /// The state that is current once this write has been applied.
    pub fn resolve(self, previous: Option<CounterState>) -> Option<CounterState> {
        match self {
            StateWrite::Unchanged => previous,
            StateWrite::Put(state) => Some(state),
            StateWrite::Delete => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub reply: CounterReply,
    pub write: StateWrite,
}

/// Longest window or cooldown an operation may ask for.
pub const MAX_DURATION_SECS: i64 = 10 * 365 * 86_400;

fn check_duration(field: &str, secs: i64) -> Result<(), CounterError> {
    if secs <= 0 {
        Err(CounterError::InvalidInput(format!(
            "{field} must be positive, got {secs}"
        )))
    } else if secs > MAX_DURATION_SECS {
        Err(CounterError::InvalidInput(format!(
            "{field} must be at most {MAX_DURATION_SECS}, got {secs}"
        )))
    } else {
        Ok(())
    }
}

impl CounterOp {
    pub fn name(&self) -> &'static str {
        match self {
            CounterOp::IncrementWindow { .. } => "incrementWindow",
            CounterOp::CheckCooldown { .. } => "checkCooldown",
            CounterOp::Peek => "peek",
            CounterOp::IncrementFixedExpiry { .. } => "incrementFixedExpiry",
        }
    }

    pub fn validate(&self) -> Result<(), CounterError> {
        match *self {
            CounterOp::IncrementWindow {
                limit,
                window_seconds,
            } => {
                if limit <= 0 {
                    return Err(CounterError::InvalidInput(format!(
                        "limit must be positive, got {limit}"
                    )));
                }
                check_duration("windowSeconds", window_seconds)
            }
            CounterOp::CheckCooldown { cooldown_seconds } => {
                check_duration("cooldownSeconds", cooldown_seconds)
            }
            _ => Ok(()),
        }
    }

    /// Run the operation against `current` at time `now`.
    ///
    /// `current` is the stored state as loaded, expired or not.
    pub fn apply(&self, current: Option<CounterState>, now: i64) -> Result<Transition, CounterError> {
        self.validate()?;

        let live = current.filter(|state| state.is_live(now));
        // Reading a dead state deletes it.
        let housekeeping = if current.is_some() && live.is_none() {
            StateWrite::Delete
        } else {
            StateWrite::Unchanged
        };

        let transition = match *self {
            CounterOp::IncrementWindow {
                limit,
                window_seconds,
            } => {
                let limit = limit as u64;
                let state = live.unwrap_or(CounterState::new(0, now + window_seconds));

                if state.count >= limit {
                    Transition {
                        reply: CounterReply::Window(WindowDecision {
                            allowed: false,
                            remaining: 0,
                            reset_at: state.expires_at,
                            count: state.count,
                        }),
                        write: housekeeping,
                    }
                } else {
                    let next = CounterState::new(state.count + 1, state.expires_at);
                    Transition {
                        reply: CounterReply::Window(WindowDecision {
                            allowed: true,
                            remaining: limit - next.count,
                            reset_at: next.expires_at,
                            count: next.count,
                        }),
                        write: StateWrite::Put(next),
                    }
                }
            }
            CounterOp::CheckCooldown { cooldown_seconds } => match live {
                Some(state) => Transition {
                    reply: CounterReply::Cooldown(CooldownDecision {
                        allowed: false,
                        remaining_seconds: state.expires_at - now,
                    }),
                    write: housekeeping,
                },
                None => Transition {
                    reply: CounterReply::Cooldown(CooldownDecision {
                        allowed: true,
                        remaining_seconds: 0,
                    }),
                    write: StateWrite::Put(CounterState::new(1, now + cooldown_seconds)),
                },
            },
            CounterOp::Peek => Transition {
                reply: CounterReply::Snapshot(live.unwrap_or_default()),
                write: housekeeping,
            },
            CounterOp::IncrementFixedExpiry { expires_at } => {
                if expires_at <= now {
                    Transition {
                        reply: CounterReply::Snapshot(CounterState::new(0, expires_at)),
                        write: if current.is_some() {
                            StateWrite::Delete
                        } else {
                            StateWrite::Unchanged
                        },
                    }
                } else {
                    let count = match live {
                        Some(state) if state.expires_at == expires_at => {
                            state.count.saturating_add(1)
                        }
                        _ => 1,
                    };
                    let next = CounterState::new(count, expires_at);
                    Transition {
                        reply: CounterReply::Snapshot(next),
                        write: StateWrite::Put(next),
                    }
                }
            }
        };

        Ok(transition)
    }
}
