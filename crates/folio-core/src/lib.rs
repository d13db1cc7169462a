//! # Folio Core
//!
//! The domain layer of the rate-limiting subsystem.
//! This crate contains the counter state machine, the ports its backends
//! implement, and the policy layer. It has no infrastructure dependencies.

pub mod domain;
pub mod error;
pub mod policy;
pub mod ports;

pub use error::{CounterError, RateLimitExceeded};
