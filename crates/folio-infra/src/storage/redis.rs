//! Redis counter storage - states survive process restarts.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use folio_core::domain::CounterState;
use folio_core::error::CounterError;
use folio_core::ports::CounterStorage;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fall back to in-memory storage if Redis is unavailable
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: true,
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            fallback_to_memory: std::env::var("REDIS_FALLBACK_TO_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }

    /// Open a managed connection, giving up after `connect_timeout`.
    pub async fn connect(&self) -> Result<ConnectionManager, CounterError> {
        let client =
            Client::open(self.url.as_str()).map_err(|e| CounterError::Storage(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        tokio::time::timeout(self.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CounterError::Storage("Connection timed out".to_string()))?
            .map_err(|e| CounterError::Storage(e.to_string()))
    }
}

/// Counter states stored as JSON strings that expire with the state.
pub struct RedisCounterStorage {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisCounterStorage {
    pub async fn new(config: &RedisConfig, key_prefix: impl Into<String>) -> Result<Self, CounterError> {
        let conn = config.connect().await?;
        tracing::info!(url = %config.url, "Connected to Redis counter storage");

        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
        })
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CounterStorage for RedisCounterStorage {
    async fn load(&self, key: &str) -> Result<Option<CounterState>, CounterError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.make_key(key))
            .await
            .map_err(|e| CounterError::Storage(e.to_string()))?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| {
                CounterError::Storage(format!("corrupt counter state for {key}: {e}"))
            })
        })
        .transpose()
    }

    async fn save(&self, key: &str, state: &CounterState) -> Result<(), CounterError> {
        let mut conn = self.conn.clone();
        let json =
            serde_json::to_string(state).map_err(|e| CounterError::Storage(e.to_string()))?;

        // EXAT lets Redis drop the state at the moment it dies.
        let _: () = redis::cmd("SET")
            .arg(self.make_key(key))
            .arg(json)
            .arg("EXAT")
            .arg(state.expires_at)
            .query_async(&mut conn)
            .await
            .map_err(|e| CounterError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CounterError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.make_key(key))
            .await
            .map_err(|e| CounterError::Storage(e.to_string()))
    }

    async fn purge_expired(&self, _now: i64) -> Result<usize, CounterError> {
        // Redis expires keys on its own.
        Ok(0)
    }
}
