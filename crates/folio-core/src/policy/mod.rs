//! Policy layer - business rate limits expressed as counter actor calls.
//!
//! Policies are stateless: each picks a key, a limit and a window, calls the
//! actor, and turns the generic reply into an allow/deny decision.
//!
//! Actor failures never deny. Every policy logs the error and allows with a
//! degraded decision.

pub mod keys;
mod magic_link;
mod message;

#[cfg(test)]
mod testing;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::WindowDecision;
use crate::error::CounterError;
use crate::ports::{Clock, CounterActor, SystemClock};

pub use magic_link::{MagicLinkAllowance, MagicLinkStatus};
pub use message::DailyQuota;

const SECONDS_PER_HOUR: i64 = 3600;
const SECONDS_PER_DAY: i64 = 86_400;

pub const MAGIC_LINK_IP_LIMIT: i64 = 5;
pub const MAGIC_LINK_EMAIL_HOURLY_LIMIT: i64 = 3;
pub const MAGIC_LINK_EMAIL_COOLDOWN_SECS: i64 = 60;
pub const MAGIC_LINK_GLOBAL_HOURLY_LIMIT: i64 = 100;
pub const MESSAGE_IP_HOURLY_LIMIT: i64 = 20;
pub const MESSAGE_USER_COOLDOWN_SECS: i64 = 60;

/// Remaining count reported when an actor call fails and the policy allows anyway.
pub const FAIL_OPEN_REMAINING: u64 = 0;

/// Policy configuration.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    /// Deadline for one actor call. Elapsing counts as a transport failure.
    pub call_timeout: Duration,
    /// Offset from UTC, in seconds, that defines "local midnight" for daily quotas.
    pub utc_offset_secs: i32,
    /// Messages a user may post per local day.
    pub daily_message_limit: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(2000),
            utc_offset_secs: 8 * 3600,
            daily_message_limit: 10,
        }
    }
}

impl PolicyConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            call_timeout: std::env::var("COUNTER_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.call_timeout),
            utc_offset_secs: std::env::var("RATE_LIMIT_UTC_OFFSET_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &i32| secs.abs() < SECONDS_PER_DAY as i32)
                .unwrap_or(defaults.utc_offset_secs),
            daily_message_limit: std::env::var("DAILY_MESSAGE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.daily_message_limit),
        }
    }
}

/// Outcome of a single policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u64,
    /// Seconds until the action may be retried. Zero when allowed.
    pub retry_after_secs: i64,
    /// True when the actor could not be consulted and the policy failed open.
    pub degraded: bool,
}

impl Decision {
    pub fn allow(remaining: u64) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after_secs: 0,
            degraded: false,
        }
    }

    pub fn deny(retry_after_secs: i64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after_secs: retry_after_secs.max(0),
            degraded: false,
        }
    }

    pub fn fail_open() -> Self {
        Self {
            allowed: true,
            remaining: FAIL_OPEN_REMAINING,
            retry_after_secs: 0,
            degraded: true,
        }
    }
}

/// Business rate limits on top of a counter actor.
#[derive(Clone)]
pub struct RateLimitPolicy {
    actor: Arc<dyn CounterActor>,
    clock: Arc<dyn Clock>,
    config: PolicyConfig,
}

impl RateLimitPolicy {
    pub fn new(actor: Arc<dyn CounterActor>, config: PolicyConfig) -> Self {
        Self::with_clock(actor, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        actor: Arc<dyn CounterActor>,
        clock: Arc<dyn Clock>,
        config: PolicyConfig,
    ) -> Self {
        Self {
            actor,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Unix time of the next local midnight after now.
    pub fn next_local_midnight(&self) -> i64 {
        next_local_midnight(self.clock.now(), self.config.utc_offset_secs)
    }

    /// Bound an actor call by the configured deadline.
    async fn within_deadline<T>(
        &self,
        call: impl Future<Output = Result<T, CounterError>>,
    ) -> Result<T, CounterError> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CounterError::Timeout(self.config.call_timeout)),
        }
    }

    async fn window(
        &self,
        key: &str,
        limit: i64,
        window_seconds: i64,
    ) -> Result<WindowDecision, CounterError> {
        self.within_deadline(self.actor.increment_window(key, limit, window_seconds))
            .await
    }

    /// Fixed-window check, failing open.
    async fn window_check(&self, key: &str, limit: i64, window_seconds: i64) -> Decision {
        match self.window(key, limit, window_seconds).await {
            Ok(decision) if decision.allowed => Decision::allow(decision.remaining),
            Ok(decision) => {
                tracing::debug!(key = %key, count = decision.count, limit, "Window limit reached");
                Decision::deny(decision.reset_at - self.clock.now())
            }
            Err(e) => fail_open(key, &e),
        }
    }

    /// Cooldown check, failing open.
    async fn cooldown_check(&self, key: &str, cooldown_seconds: i64) -> Decision {
        match self
            .within_deadline(self.actor.check_cooldown(key, cooldown_seconds))
            .await
        {
            Ok(decision) if decision.allowed => Decision::allow(0),
            Ok(decision) => {
                tracing::debug!(
                    key = %key,
                    remaining_seconds = decision.remaining_seconds,
                    "Cooldown active"
                );
                Decision::deny(decision.remaining_seconds)
            }
            Err(e) => fail_open(key, &e),
        }
    }
}

/// The single place where an actor failure becomes an allow.
fn fail_open(key: &str, error: &CounterError) -> Decision {
    if error.is_client_error() {
        tracing::error!(key = %key, error = %error, "Counter rejected a policy operation, failing open");
    } else {
        tracing::error!(key = %key, error = %error, "Counter call failed, failing open");
    }
    Decision::fail_open()
}

/// Unix time of the first local midnight strictly after `now`.
pub fn next_local_midnight(now: i64, utc_offset_secs: i32) -> i64 {
    let offset = i64::from(utc_offset_secs);
    let local_day_start = (now + offset).div_euclid(SECONDS_PER_DAY) * SECONDS_PER_DAY;
    local_day_start + SECONDS_PER_DAY - offset
}
