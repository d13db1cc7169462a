//! Application state - shared across all handlers.

use std::sync::Arc;

use folio_core::error::CounterError;
use folio_core::ports::CounterStorage;
use folio_infra::{InMemoryCounterStorage, LocalActorConfig, LocalCounterActors};

#[cfg(feature = "redis")]
use folio_infra::RedisCounterStorage;

use crate::config::{AppConfig, StorageBackend};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub actors: Arc<LocalCounterActors>,
    pub storage: Arc<dyn CounterStorage>,
    pub storage_backend: StorageBackend,
}

impl AppState {
    /// Build the application state with the configured storage.
    pub async fn new(config: &AppConfig) -> Result<Self, CounterError> {
        let (storage, backend) = Self::init_storage(config).await?;

        tracing::info!(storage = backend.as_str(), "Application state initialized");

        Ok(Self::with_storage(storage, backend, config.actors.clone()))
    }

    /// Build the state around an existing storage.
    pub fn with_storage(
        storage: Arc<dyn CounterStorage>,
        backend: StorageBackend,
        actors: LocalActorConfig,
    ) -> Self {
        Self {
            actors: Arc::new(LocalCounterActors::new(storage.clone(), actors)),
            storage,
            storage_backend: backend,
        }
    }

    async fn init_storage(
        config: &AppConfig,
    ) -> Result<(Arc<dyn CounterStorage>, StorageBackend), CounterError> {
        let memory = || -> (Arc<dyn CounterStorage>, StorageBackend) {
            (Arc::new(InMemoryCounterStorage::new()), StorageBackend::Memory)
        };

        match config.storage {
            StorageBackend::Memory => Ok(memory()),

            #[cfg(feature = "redis")]
            StorageBackend::Redis => {
                match RedisCounterStorage::new(&config.redis, config.key_prefix.clone()).await {
                    Ok(storage) => Ok((Arc::new(storage), StorageBackend::Redis)),
                    Err(e) if config.redis.fallback_to_memory => {
                        tracing::error!(
                            error = %e,
                            "Failed to connect to Redis. Using in-memory counter storage."
                        );
                        Ok(memory())
                    }
                    Err(e) => Err(e),
                }
            }

            #[cfg(not(feature = "redis"))]
            StorageBackend::Redis => {
                tracing::warn!("Built without redis feature - using in-memory counter storage");
                Ok(memory())
            }
        }
    }
}
