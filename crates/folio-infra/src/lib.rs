//! # Folio Infrastructure
//!
//! Concrete implementations of the counter ports defined in `folio-core`.
//! This crate contains the per-key actor runtime, state storage, and the
//! remote counter adapters.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `redis` - Redis state storage and the Lua counter backend
//! - `http` - Client for a remote counter service

pub mod actor;
pub mod storage;

// Re-exports - In-Memory
pub use actor::{LocalActorConfig, LocalCounterActors};
pub use storage::InMemoryCounterStorage;

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use actor::{RedisCounterBackend, RedisCounterConfig};
#[cfg(feature = "redis")]
pub use storage::{RedisConfig, RedisCounterStorage};

// Re-exports - HTTP
#[cfg(feature = "http")]
pub use actor::{HttpCounterClient, HttpCounterConfig};
