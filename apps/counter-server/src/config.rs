//! Application configuration loaded from environment variables.

use std::env;

use folio_infra::LocalActorConfig;

#[cfg(feature = "redis")]
use folio_infra::RedisConfig;

#[cfg(feature = "sweeper")]
use crate::background::SweeperConfig;

/// Where counter states are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Redis,
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Redis => "redis",
        }
    }

    fn from_env() -> Self {
        match env::var("COUNTER_STORAGE")
            .map(|v| v.to_lowercase())
            .as_deref()
        {
            Ok("redis") => StorageBackend::Redis,
            Ok("memory") | Err(_) => StorageBackend::Memory,
            Ok(other) => {
                tracing::warn!(value = %other, "Unknown COUNTER_STORAGE, using memory");
                StorageBackend::Memory
            }
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub key_prefix: String,
    pub actors: LocalActorConfig,
    #[cfg(feature = "redis")]
    pub redis: RedisConfig,
    #[cfg(feature = "sweeper")]
    pub sweeper: SweeperConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8787),
            storage: StorageBackend::from_env(),
            key_prefix: env::var("COUNTER_KEY_PREFIX").unwrap_or_else(|_| "counter".to_string()),
            actors: LocalActorConfig::from_env(),
            #[cfg(feature = "redis")]
            redis: RedisConfig::from_env(),
            #[cfg(feature = "sweeper")]
            sweeper: SweeperConfig::from_env(),
        }
    }
}
