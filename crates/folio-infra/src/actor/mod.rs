//! Counter actor adapters - in-process actors, Redis scripts, and HTTP.

mod local;

pub use local::{LocalActorConfig, LocalCounterActors};

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisCounterBackend, RedisCounterConfig};

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::{HttpCounterClient, HttpCounterConfig};
