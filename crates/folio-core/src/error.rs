//! Domain-level error types.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by a counter actor call.
///
/// A business denial (`allowed: false`) is never an error; it is a normal reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CounterError {
    /// Malformed operation parameters. Client-error class.
    #[error("Invalid counter operation: {0}")]
    InvalidInput(String),

    /// The actor's state storage failed.
    #[error("Counter storage failed: {0}")]
    Storage(String),

    /// The actor could not be reached, or answered with something unusable.
    #[error("Counter transport failed: {0}")]
    Transport(String),

    /// The call did not complete within the caller's deadline.
    #[error("Counter call timed out after {0:?}")]
    Timeout(Duration),
}

impl CounterError {
    /// True for errors caused by the caller rather than the infrastructure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, CounterError::InvalidInput(_))
    }
}

/// A policy denied the action. Carries the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RateLimitExceeded {
    pub message: String,
    pub retry_after_secs: i64,
}

impl RateLimitExceeded {
    pub fn new(message: impl Into<String>, retry_after_secs: i64) -> Self {
        Self {
            message: message.into(),
            retry_after_secs: retry_after_secs.max(0),
        }
    }
}
