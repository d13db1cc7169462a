//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod clock;
mod counter;
mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::CounterActor;
pub use storage::CounterStorage;
