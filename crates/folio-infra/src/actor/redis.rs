//! Redis counter backend - every operation is one atomic Lua script.
//!
//! Redis runs scripts one at a time, so it plays the actor for every key at
//! once. Processes that share a Redis can use this directly instead of going
//! through the counter service.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use folio_core::domain::{
    CooldownDecision, CounterOp, CounterReply, CounterState, WindowDecision,
};
use folio_core::error::CounterError;
use folio_core::ports::CounterActor;

use crate::storage::RedisConfig;

/// Redis counter backend configuration.
#[derive(Debug, Clone)]
pub struct RedisCounterConfig {
    /// Redis connection config
    pub redis: RedisConfig,
    /// Key prefix for counter hashes
    pub key_prefix: String,
}

impl Default for RedisCounterConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            key_prefix: "counter:atomic".to_string(),
        }
    }
}

impl RedisCounterConfig {
    pub fn from_env() -> Self {
        Self {
            redis: RedisConfig::from_env(),
            key_prefix: std::env::var("COUNTER_KEY_PREFIX")
                .map(|prefix| format!("{prefix}:atomic"))
                .unwrap_or_else(|_| "counter:atomic".to_string()),
        }
    }
}

// State is a hash {count, expires_at} with EXPIREAT set to expires_at.
// Time comes from the Redis server so all clients agree on it.
const COUNTER_SCRIPT: &str = r#"
local key = KEYS[1]
local op = ARGV[1]
local now = tonumber(redis.call('TIME')[1])

local count, expires_at, live = 0, 0, false
local fields = redis.call('HMGET', key, 'count', 'expires_at')
if fields[1] and fields[2] then
    count = tonumber(fields[1])
    expires_at = tonumber(fields[2])
    live = expires_at > now
    if not live then
        redis.call('DEL', key)
        count, expires_at = 0, 0
    end
end

local function put(c, e)
    redis.call('HSET', key, 'count', c, 'expires_at', e)
    redis.call('EXPIREAT', key, e)
end

if op == 'incrementWindow' then
    local limit = tonumber(ARGV[2])
    if not live then
        count, expires_at = 0, now + tonumber(ARGV[3])
    end
    if count >= limit then
        return {0, 0, expires_at, count}
    end
    count = count + 1
    put(count, expires_at)
    return {1, limit - count, expires_at, count}
elseif op == 'checkCooldown' then
    if live then
        return {0, expires_at - now}
    end
    put(1, now + tonumber(ARGV[2]))
    return {1, 0}
elseif op == 'peek' then
    return {count, expires_at}
elseif op == 'incrementFixedExpiry' then
    local target = tonumber(ARGV[2])
    if target <= now then
        redis.call('DEL', key)
        return {0, target}
    end
    if live and expires_at == target then
        count = count + 1
    else
        count = 1
    end
    put(count, target)
    return {count, target}
end
return redis.error_reply('unknown counter op ' .. tostring(op))
"#;

/// Counter actor backed by Redis Lua scripts.
pub struct RedisCounterBackend {
    conn: ConnectionManager,
    config: RedisCounterConfig,
    script: Script,
}

impl RedisCounterBackend {
    pub async fn new(config: RedisCounterConfig) -> Result<Self, CounterError> {
        let conn = config
            .redis
            .connect()
            .await
            .map_err(|e| CounterError::Transport(e.to_string()))?;

        tracing::info!(url = %config.redis.url, "Connected to Redis counter backend");

        Ok(Self {
            conn,
            config,
            script: Script::new(COUNTER_SCRIPT),
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, CounterError> {
        Self::new(RedisCounterConfig::from_env()).await
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }
}

fn field(values: &[i64], index: usize, op: &CounterOp) -> Result<i64, CounterError> {
    values.get(index).copied().ok_or_else(|| {
        CounterError::Transport(format!(
            "short reply to {}: {:?}",
            op.name(),
            values
        ))
    })
}

fn decode(op: &CounterOp, values: &[i64]) -> Result<CounterReply, CounterError> {
    let reply = match op {
        CounterOp::IncrementWindow { .. } => CounterReply::Window(WindowDecision {
            allowed: field(values, 0, op)? == 1,
            remaining: field(values, 1, op)?.max(0) as u64,
            reset_at: field(values, 2, op)?,
            count: field(values, 3, op)?.max(0) as u64,
        }),
        CounterOp::CheckCooldown { .. } => CounterReply::Cooldown(CooldownDecision {
            allowed: field(values, 0, op)? == 1,
            remaining_seconds: field(values, 1, op)?,
        }),
        CounterOp::Peek | CounterOp::IncrementFixedExpiry { .. } => {
            CounterReply::Snapshot(CounterState::new(
                field(values, 0, op)?.max(0) as u64,
                field(values, 1, op)?,
            ))
        }
    };
    Ok(reply)
}

#[async_trait]
impl CounterActor for RedisCounterBackend {
    async fn call(&self, key: &str, op: CounterOp) -> Result<CounterReply, CounterError> {
        op.validate()?;

        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        let mut invocation = self.script.key(&redis_key);
        invocation.arg(op.name());
        match op {
            CounterOp::IncrementWindow {
                limit,
                window_seconds,
            } => {
                invocation.arg(limit).arg(window_seconds);
            }
            CounterOp::CheckCooldown { cooldown_seconds } => {
                invocation.arg(cooldown_seconds);
            }
            CounterOp::IncrementFixedExpiry { expires_at } => {
                invocation.arg(expires_at);
            }
            CounterOp::Peek => {}
        }

        let values: Vec<i64> = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CounterError::Transport(e.to_string()))?;

        decode(&op, &values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn get_test_backend() -> Option<RedisCounterBackend> {
        let config = RedisCounterConfig {
            redis: RedisConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6389".to_string()),
                connect_timeout: Duration::from_secs(1),
                fallback_to_memory: false,
            },
            key_prefix: "test_counter_atomic".to_string(),
        };

        RedisCounterBackend::new(config).await.ok()
    }

    #[test]
    fn test_decode_window_reply() {
        let op = CounterOp::IncrementWindow {
            limit: 3,
            window_seconds: 60,
        };
        assert_eq!(
            decode(&op, &[1, 2, 1_700_000_060, 1]).unwrap(),
            CounterReply::Window(WindowDecision {
                allowed: true,
                remaining: 2,
                reset_at: 1_700_000_060,
                count: 1,
            })
        );
        assert!(matches!(
            decode(&op, &[1, 2]),
            Err(CounterError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_redis_backend_window_and_cooldown() {
        let backend = match get_test_backend().await {
            Some(b) => b,
            None => return,
        };

        let key = format!("window_{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());

        // First request - allowed
        let res = backend.increment_window(&key, 2, 60).await.unwrap();
        assert!(res.allowed);
        assert_eq!(res.remaining, 1);

        // Second request - allowed
        let res = backend.increment_window(&key, 2, 60).await.unwrap();
        assert!(res.allowed);
        assert_eq!(res.remaining, 0);

        // Third request - rejected, count unchanged
        let res = backend.increment_window(&key, 2, 60).await.unwrap();
        assert!(!res.allowed);
        assert_eq!(res.count, 2);
        assert_eq!(backend.peek(&key).await.unwrap().count, 2);

        let cooldown_key = format!("{key}_cooldown");
        assert!(backend.check_cooldown(&cooldown_key, 30).await.unwrap().allowed);
        let denied = backend.check_cooldown(&cooldown_key, 30).await.unwrap();
        assert!(!denied.allowed);
        assert!(denied.remaining_seconds > 0 && denied.remaining_seconds <= 30);
    }

    #[tokio::test]
    async fn test_redis_backend_fixed_expiry() {
        let backend = match get_test_backend().await {
            Some(b) => b,
            None => return,
        };

        let key = format!("fixed_{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
        let now = chrono::Utc::now().timestamp();

        for expected in 1..=3 {
            let snapshot = backend.increment_fixed_expiry(&key, now + 120).await.unwrap();
            assert_eq!(snapshot.count, expected);
        }
        let rolled = backend.increment_fixed_expiry(&key, now + 240).await.unwrap();
        assert_eq!(rolled.count, 1);

        let reset = backend.increment_fixed_expiry(&key, now - 10).await.unwrap();
        assert_eq!(reset.count, 0);
        assert_eq!(backend.peek(&key).await.unwrap(), CounterState::default());
    }
}
