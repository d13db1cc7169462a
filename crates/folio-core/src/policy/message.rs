//! Comment-board posting limits.

use crate::error::RateLimitExceeded;

use super::keys;
use super::{
    Decision, MESSAGE_IP_HOURLY_LIMIT, MESSAGE_USER_COOLDOWN_SECS, RateLimitPolicy,
    SECONDS_PER_HOUR,
};

/// A user's message count for the current local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyQuota {
    pub used: u64,
    pub limit: u64,
    pub remaining: u64,
    /// Unix time of the local midnight that ends the day.
    pub resets_at: i64,
    pub degraded: bool,
}

impl RateLimitPolicy {
    /// Per-IP throttle on message posts.
    pub async fn check_message_ip(&self, ip: &str) -> Decision {
        self.window_check(&keys::message_ip(ip), MESSAGE_IP_HOURLY_LIMIT, SECONDS_PER_HOUR)
            .await
    }

    /// One post per user per cooldown period.
    pub async fn check_message_cooldown(&self, user_id: &str) -> Decision {
        self.cooldown_check(
            &keys::message_user_cooldown(user_id),
            MESSAGE_USER_COOLDOWN_SECS,
        )
        .await
    }

    /// Today's usage. Read-only; the count moves in `record_message_post`.
    pub async fn daily_message_status(&self, user_id: &str) -> DailyQuota {
        let key = keys::message_user_today(user_id);
        let limit = self.config.daily_message_limit;
        let resets_at = self.next_local_midnight();

        match self.within_deadline(self.actor.peek(&key)).await {
            Ok(snapshot) => {
                // A count pinned to another day's midnight belongs to that day.
                let used = if snapshot.expires_at == resets_at {
                    snapshot.count
                } else {
                    0
                };
                DailyQuota {
                    used,
                    limit,
                    remaining: limit.saturating_sub(used),
                    resets_at,
                    degraded: false,
                }
            }
            Err(e) => {
                super::fail_open(&key, &e);
                DailyQuota {
                    used: 0,
                    limit,
                    remaining: super::FAIL_OPEN_REMAINING,
                    resets_at,
                    degraded: true,
                }
            }
        }
    }

    /// Whether the user still has posts left today.
    pub async fn check_daily_quota(&self, user_id: &str) -> Decision {
        let quota = self.daily_message_status(user_id).await;
        if quota.degraded {
            Decision::fail_open()
        } else if quota.used >= quota.limit {
            Decision::deny(quota.resets_at - self.clock.now())
        } else {
            Decision::allow(quota.remaining)
        }
    }

    /// Gate one message post: IP throttle, then user cooldown, then daily quota.
    pub async fn check_message_post(
        &self,
        ip: &str,
        user_id: &str,
    ) -> Result<Decision, RateLimitExceeded> {
        let ip_decision = self.check_message_ip(ip).await;
        if !ip_decision.allowed {
            return Err(RateLimitExceeded::new(
                format!(
                    "留言过于频繁，请等待 {} 秒后再试",
                    ip_decision.retry_after_secs
                ),
                ip_decision.retry_after_secs,
            ));
        }

        let cooldown = self.check_message_cooldown(user_id).await;
        if !cooldown.allowed {
            return Err(RateLimitExceeded::new(
                format!("请等待 {} 秒后再发送留言", cooldown.retry_after_secs),
                cooldown.retry_after_secs,
            ));
        }

        let daily = self.check_daily_quota(user_id).await;
        if !daily.allowed {
            return Err(RateLimitExceeded::new(
                "今天的留言次数已用完，还剩 0 次",
                daily.retry_after_secs,
            ));
        }

        Ok(daily)
    }

    /// Count a message that was stored. Call after the insert succeeds.
    pub async fn record_message_post(&self, user_id: &str) -> DailyQuota {
        let key = keys::message_user_today(user_id);
        let limit = self.config.daily_message_limit;
        let resets_at = self.next_local_midnight();

        match self
            .within_deadline(self.actor.increment_fixed_expiry(&key, resets_at))
            .await
        {
            Ok(snapshot) => DailyQuota {
                used: snapshot.count,
                limit,
                remaining: limit.saturating_sub(snapshot.count),
                resets_at,
                degraded: false,
            },
            Err(e) => {
                super::fail_open(&key, &e);
                DailyQuota {
                    used: 0,
                    limit,
                    remaining: super::FAIL_OPEN_REMAINING,
                    resets_at,
                    degraded: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::PolicyConfig;
    use super::super::testing::{FailingActor, LocalActor, PartiallyFailingActor};
    use super::*;
    use crate::ports::ManualClock;

    // 2023-11-14T22:13:20Z, 06:13:20 on the 15th at UTC+8.
    const NOW: i64 = 1_700_000_000;
    const LOCAL_MIDNIGHT: i64 = 1_700_064_000;

    fn policy(clock: Arc<ManualClock>, daily_limit: u64) -> RateLimitPolicy {
        let config = PolicyConfig {
            daily_message_limit: daily_limit,
            ..PolicyConfig::default()
        };
        RateLimitPolicy::with_clock(Arc::new(LocalActor::new(clock.clone())), clock, config)
    }

    #[tokio::test]
    async fn test_post_flow_enforces_daily_quota() {
        let clock = Arc::new(ManualClock::new(NOW));
        let policy = policy(clock.clone(), 2);

        for used in 1..=2 {
            policy.check_message_post("1.1.1.1", "7").await.unwrap();
            let quota = policy.record_message_post("7").await;
            assert_eq!(quota.used, used);
            assert_eq!(quota.resets_at, LOCAL_MIDNIGHT);
            clock.advance(61);
        }

        let denied = policy.check_message_post("1.1.1.1", "7").await.unwrap_err();
        assert!(denied.message.contains("还剩 0 次"));
        assert_eq!(denied.retry_after_secs, LOCAL_MIDNIGHT - NOW - 122);
    }

    #[tokio::test]
    async fn test_daily_quota_rolls_over_at_local_midnight() {
        let clock = Arc::new(ManualClock::new(NOW));
        let policy = policy(clock.clone(), 1);

        policy.record_message_post("7").await;
        assert!(!policy.check_daily_quota("7").await.allowed);

        clock.set(LOCAL_MIDNIGHT);
        let status = policy.daily_message_status("7").await;
        assert_eq!(status.used, 0);
        assert_eq!(status.resets_at, LOCAL_MIDNIGHT + 86_400);
        assert!(policy.check_daily_quota("7").await.allowed);

        let quota = policy.record_message_post("7").await;
        assert_eq!(quota.used, 1);
    }

    #[tokio::test]
    async fn test_user_cooldown_blocks_second_post() {
        let clock = Arc::new(ManualClock::new(NOW));
        let policy = policy(clock.clone(), 10);

        policy.check_message_post("1.1.1.1", "7").await.unwrap();
        clock.advance(30);

        let denied = policy.check_message_post("1.1.1.1", "7").await.unwrap_err();
        assert!(denied.message.contains("请等待 30 秒"));
        // Another user is unaffected.
        assert!(policy.check_message_post("1.1.1.1", "8").await.is_ok());
    }

    #[tokio::test]
    async fn test_ip_throttle_failure_lets_post_through() {
        let clock = Arc::new(ManualClock::new(NOW));
        let actor = PartiallyFailingActor {
            inner: LocalActor::new(clock.clone()),
            needle: "ip:",
        };
        let policy = RateLimitPolicy::with_clock(Arc::new(actor), clock, PolicyConfig::default());

        let ip = policy.check_message_ip("9.9.9.9").await;
        assert!(ip.allowed);
        assert!(ip.degraded);

        let decision = policy.check_message_post("9.9.9.9", "7").await.unwrap();
        assert!(decision.allowed);
        assert!(!decision.degraded);
        // The checks behind the failed one still apply.
        assert!(policy.check_message_post("9.9.9.9", "7").await.is_err());
    }

    #[tokio::test]
    async fn test_post_proceeds_when_actor_is_down() {
        let policy = RateLimitPolicy::new(Arc::new(FailingActor), PolicyConfig::default());

        let decision = policy.check_message_post("9.9.9.9", "7").await.unwrap();
        assert!(decision.allowed);
        assert!(decision.degraded);

        let quota = policy.record_message_post("7").await;
        assert!(quota.degraded);
    }
}
