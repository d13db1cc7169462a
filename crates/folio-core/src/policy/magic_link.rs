//! Magic-link sending limits.

use crate::error::RateLimitExceeded;

use super::keys;
use super::{
    Decision, MAGIC_LINK_EMAIL_COOLDOWN_SECS, MAGIC_LINK_EMAIL_HOURLY_LIMIT,
    MAGIC_LINK_GLOBAL_HOURLY_LIMIT, MAGIC_LINK_IP_LIMIT, RateLimitPolicy, SECONDS_PER_HOUR,
};

/// A magic-link send was allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicLinkAllowance {
    /// Sends left for this address in the current hour.
    pub remaining_hourly: u64,
    pub degraded: bool,
}

impl MagicLinkAllowance {
    /// Text shown after a successful send. The UI matches `还剩 N 次`.
    pub fn message(&self) -> String {
        format!("登录链接已发送，本小时还剩 {} 次", self.remaining_hourly)
    }
}

/// Display-only view of an address's magic-link limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicLinkStatus {
    pub remaining_hourly: u64,
    pub cooldown_remaining_secs: i64,
}

/// The UI matches `请等待 N 秒` in every denial.
fn wait_message(reason: &str, secs: i64) -> String {
    format!("{reason}，请等待 {secs} 秒后再试")
}

impl RateLimitPolicy {
    /// Per-IP throttle on magic-link requests.
    pub async fn check_magic_link_ip(&self, ip: &str) -> Decision {
        self.window_check(&keys::magic_link_ip(ip), MAGIC_LINK_IP_LIMIT, SECONDS_PER_HOUR)
            .await
    }

    /// Gate one magic-link e-mail to `email`.
    ///
    /// Checks the global budget, then the per-address hourly cap, then the
    /// per-address cooldown, stopping at the first denial.
    pub async fn check_magic_link_send(
        &self,
        email: &str,
    ) -> Result<MagicLinkAllowance, RateLimitExceeded> {
        let global = self
            .window_check(
                keys::MAGIC_LINK_GLOBAL,
                MAGIC_LINK_GLOBAL_HOURLY_LIMIT,
                SECONDS_PER_HOUR,
            )
            .await;
        if !global.allowed {
            tracing::warn!("Global magic-link budget exhausted");
            return Err(RateLimitExceeded::new(
                wait_message("系统发送量已达上限", global.retry_after_secs),
                global.retry_after_secs,
            ));
        }

        let hourly = self
            .window_check(
                &keys::magic_link_email_hour(email),
                MAGIC_LINK_EMAIL_HOURLY_LIMIT,
                SECONDS_PER_HOUR,
            )
            .await;
        if !hourly.allowed {
            tracing::info!("Magic-link hourly cap reached for address");
            return Err(RateLimitExceeded::new(
                wait_message("该邮箱本小时发送次数已用完", hourly.retry_after_secs),
                hourly.retry_after_secs,
            ));
        }

        let cooldown = self
            .cooldown_check(
                &keys::magic_link_email_cooldown(email),
                MAGIC_LINK_EMAIL_COOLDOWN_SECS,
            )
            .await;
        if !cooldown.allowed {
            return Err(RateLimitExceeded::new(
                wait_message("发送过于频繁", cooldown.retry_after_secs),
                cooldown.retry_after_secs,
            ));
        }

        Ok(MagicLinkAllowance {
            remaining_hourly: hourly.remaining,
            degraded: global.degraded || hourly.degraded || cooldown.degraded,
        })
    }

    /// Remaining sends and cooldown for `email`, without consuming anything.
    pub async fn magic_link_status(&self, email: &str) -> MagicLinkStatus {
        let now = self.clock.now();
        let limit = MAGIC_LINK_EMAIL_HOURLY_LIMIT as u64;

        let hour_key = keys::magic_link_email_hour(email);
        let remaining_hourly = match self.within_deadline(self.actor.peek(&hour_key)).await {
            Ok(snapshot) => limit.saturating_sub(snapshot.count),
            Err(e) => {
                super::fail_open(&hour_key, &e);
                limit
            }
        };

        let cooldown_key = keys::magic_link_email_cooldown(email);
        let cooldown_remaining_secs =
            match self.within_deadline(self.actor.peek(&cooldown_key)).await {
                Ok(snapshot) if snapshot.count > 0 => (snapshot.expires_at - now).max(0),
                Ok(_) => 0,
                Err(e) => {
                    super::fail_open(&cooldown_key, &e);
                    0
                }
            };

        MagicLinkStatus {
            remaining_hourly,
            cooldown_remaining_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::testing::{FailingActor, LocalActor, PartiallyFailingActor};
    use super::super::PolicyConfig;
    use super::*;
    use crate::ports::{CounterActor, ManualClock};

    const NOW: i64 = 1_700_000_000;

    fn policy_with(actor: Arc<dyn CounterActor>, clock: Arc<ManualClock>) -> RateLimitPolicy {
        RateLimitPolicy::with_clock(actor, clock, PolicyConfig::default())
    }

    fn seconds_in(message: &str) -> Option<i64> {
        let start = message.find("请等待 ")? + "请等待 ".len();
        let rest = &message[start..];
        let end = rest.find(" 秒")?;
        rest[..end].parse().ok()
    }

    #[tokio::test]
    async fn test_hourly_cap_denies_fourth_send() {
        let clock = Arc::new(ManualClock::new(NOW));
        let actor = Arc::new(LocalActor::new(clock.clone()));
        let policy = policy_with(actor.clone(), clock.clone());

        for expected_remaining in [2, 1, 0] {
            assert!(policy.check_magic_link_ip("1.2.3.4").await.allowed);
            let allowance = policy.check_magic_link_send("user@x.com").await.unwrap();
            assert_eq!(allowance.remaining_hourly, expected_remaining);
            assert!(
                allowance
                    .message()
                    .contains(&format!("还剩 {expected_remaining} 次"))
            );
            clock.advance(60);
        }

        // Fourth send, cooldown already elapsed and IP cap (5) not reached.
        assert!(policy.check_magic_link_ip("1.2.3.4").await.allowed);
        let denied = policy.check_magic_link_send("user@x.com").await.unwrap_err();
        assert_eq!(denied.retry_after_secs, 3600 - 180);
        assert_eq!(seconds_in(&denied.message), Some(3600 - 180));

        // The cooldown key was never consulted on the denied call.
        let calls = actor.called_keys();
        assert_eq!(
            calls.last().map(String::as_str),
            Some("email:user@x.com:magic_link:hour")
        );
    }

    #[tokio::test]
    async fn test_cooldown_denies_quick_resend() {
        let clock = Arc::new(ManualClock::new(NOW));
        let policy = policy_with(Arc::new(LocalActor::new(clock.clone())), clock.clone());

        policy.check_magic_link_send("a@x.com").await.unwrap();
        clock.advance(15);

        let denied = policy.check_magic_link_send("A@X.com").await.unwrap_err();
        assert_eq!(denied.retry_after_secs, 45);
        assert!(denied.message.contains("请等待 45 秒"));
    }

    #[tokio::test]
    async fn test_checks_run_global_then_hourly_then_cooldown() {
        let clock = Arc::new(ManualClock::new(NOW));
        let actor = Arc::new(LocalActor::new(clock.clone()));
        let policy = policy_with(actor.clone(), clock);

        policy.check_magic_link_send("Me@X.com").await.unwrap();

        assert_eq!(
            actor.called_keys(),
            vec![
                "global:magic_link:hour".to_string(),
                "email:me@x.com:magic_link:hour".to_string(),
                "email:me@x.com:magic_link:cooldown".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_global_budget_short_circuits() {
        let clock = Arc::new(ManualClock::new(NOW));
        let actor = Arc::new(LocalActor::new(clock.clone()));
        let policy = policy_with(actor.clone(), clock.clone());

        for i in 0..MAGIC_LINK_GLOBAL_HOURLY_LIMIT {
            actor
                .increment_window(keys::MAGIC_LINK_GLOBAL, MAGIC_LINK_GLOBAL_HOURLY_LIMIT, 3600)
                .await
                .unwrap_or_else(|e| panic!("call {i} failed: {e}"));
        }
        let before = actor.called_keys().len();

        let denied = policy.check_magic_link_send("fresh@x.com").await.unwrap_err();
        assert!(denied.message.contains("请等待 3600 秒"));
        assert_eq!(actor.called_keys().len(), before + 1);
    }

    #[tokio::test]
    async fn test_send_fails_open_when_actor_is_down() {
        let clock = Arc::new(ManualClock::new(NOW));
        let policy = policy_with(Arc::new(FailingActor), clock);

        for _ in 0..10 {
            let allowance = policy.check_magic_link_send("user@x.com").await.unwrap();
            assert!(allowance.degraded);
        }
        assert!(policy.check_magic_link_ip("1.2.3.4").await.allowed);
    }

    #[tokio::test]
    async fn test_partial_failure_still_enforces_other_checks() {
        let clock = Arc::new(ManualClock::new(NOW));
        let actor = PartiallyFailingActor {
            inner: LocalActor::new(clock.clone()),
            needle: "global",
        };
        let policy = policy_with(Arc::new(actor), clock);

        let first = policy.check_magic_link_send("user@x.com").await.unwrap();
        assert!(first.degraded);
        assert!(policy.check_magic_link_send("user@x.com").await.is_err());
    }

    #[tokio::test]
    async fn test_status_reflects_usage_without_consuming() {
        let clock = Arc::new(ManualClock::new(NOW));
        let policy = policy_with(Arc::new(LocalActor::new(clock.clone())), clock.clone());

        let fresh = policy.magic_link_status("user@x.com").await;
        assert_eq!(
            fresh,
            MagicLinkStatus {
                remaining_hourly: 3,
                cooldown_remaining_secs: 0
            }
        );

        policy.check_magic_link_send("user@x.com").await.unwrap();
        clock.advance(10);

        for _ in 0..3 {
            let status = policy.magic_link_status("USER@x.com").await;
            assert_eq!(status.remaining_hourly, 2);
            assert_eq!(status.cooldown_remaining_secs, 50);
        }
    }
}
