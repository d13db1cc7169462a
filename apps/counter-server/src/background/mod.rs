//! Background jobs.

mod sweeper;

pub use sweeper::{ExpirySweeper, SweeperConfig};
