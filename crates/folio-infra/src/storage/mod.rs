//! Counter state storage - Redis and in-memory fallback.

mod memory;

pub use memory::InMemoryCounterStorage;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConfig, RedisCounterStorage};
