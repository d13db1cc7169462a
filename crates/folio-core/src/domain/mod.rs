//! Domain entities - counter state and the operations on it.

mod counter;

pub use counter::{
    CooldownDecision, CounterOp, CounterReply, CounterSnapshot, CounterState, MAX_DURATION_SECS,
    StateWrite, Transition, WindowDecision,
};
