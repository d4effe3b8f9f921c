//! Sliding-window rate limiter and security monitor.
//!
//! Counters are keyed by (actor, endpoint) and live in an expiring counter
//! store; the first call in a window sets the TTL, every call increments.
//! Exceeding the threshold denies the call and raises a security alert, and
//! repeated violations within a rolling period escalate to a hard block that
//! denies the actor everywhere until the cooldown elapses. Administrative
//! actors bypass both checks before any counter is touched.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use lru::LruCache;
use metrics::counter;
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use crate::models::security_alert::{
    SEVERITY_ALTA, SEVERITY_BAIXA, SEVERITY_CRITICA, SEVERITY_MEDIA,
};
use crate::repositories::SecurityRepository;

pub const ALERT_TYPE_RATE_LIMIT: &str = "rate_limit";
pub const ALERT_TYPE_BLOCK: &str = "block";
pub const ALERT_TYPE_UNBLOCK: &str = "unblock";

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Calls left in the current window (0 when denied).
    pub remaining: u32,
    /// When the counter window (or the hard block) expires.
    pub reset_at: DateTime<Utc>,
    /// Whether the denial came from a hard block rather than the window.
    pub blocked: bool,
}

/// One windowed counter observation.
#[derive(Debug, Clone, Copy)]
pub struct WindowCount {
    pub count: u32,
    pub expires_at: DateTime<Utc>,
}

/// Expiring-counter store. `increment_with_ttl` is a single atomic
/// operation; a fresh window starts whenever the previous one has expired.
pub trait CounterStore: Send + Sync {
    fn increment_with_ttl(&self, key: &str, ttl: Duration) -> WindowCount;

    fn remaining_ttl(&self, key: &str) -> Option<Duration>;
}

/// In-process counter store over a bounded LRU map.
pub struct InMemoryCounterStore {
    inner: Mutex<LruCache<String, WindowCount>>,
}

impl InMemoryCounterStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("positive counter capacity");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment_with_ttl(&self, key: &str, ttl: Duration) -> WindowCount {
        let now = Utc::now();
        let mut cache = self.inner.lock().expect("counter store lock");

        let fresh = WindowCount {
            count: 1,
            expires_at: now + ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::seconds(60)),
        };

        match cache.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.count += 1;
                *entry
            }
            _ => {
                cache.put(key.to_string(), fresh);
                fresh
            }
        }
    }

    fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Utc::now();
        let mut cache = self.inner.lock().expect("counter store lock");
        cache
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| (entry.expires_at - now).to_std().ok())
    }
}

/// Exemption capability consulted once per call, before any counter is
/// touched.
pub trait ExemptionCheck: Send + Sync {
    fn is_exempt(&self, actor_id: &str) -> bool;
}

/// Exemptions sourced from the configured administrative actor list.
pub struct AdminExemptions {
    admins: HashSet<String>,
}

impl AdminExemptions {
    pub fn new<I: IntoIterator<Item = String>>(admins: I) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

impl ExemptionCheck for AdminExemptions {
    fn is_exempt(&self, actor_id: &str) -> bool {
        self.admins.contains(actor_id)
    }
}

/// The limiter itself: windowed counters plus block-state enforcement.
pub struct RateLimiter {
    config: RateLimitConfig,
    counters: Arc<dyn CounterStore>,
    security: SecurityRepository,
    exemptions: Arc<dyn ExemptionCheck>,
}

impl RateLimiter {
    pub fn new(
        config: RateLimitConfig,
        counters: Arc<dyn CounterStore>,
        security: SecurityRepository,
        exemptions: Arc<dyn ExemptionCheck>,
    ) -> Self {
        Self {
            config,
            counters,
            security,
            exemptions,
        }
    }

    /// The active hard block for an actor, if any.
    pub async fn active_block(&self, actor_id: &str) -> Result<Option<DateTime<Utc>>, ApiError> {
        let block = self.security.active_block(actor_id, Utc::now()).await?;
        Ok(block.map(|block| block.blocked_until.with_timezone(&Utc)))
    }

    /// Check and count one call. Denied calls never reach the gated
    /// operation; callers receive the decision's `reset_at` so they can
    /// queue-and-wait instead of failing outright.
    pub async fn check_and_increment(
        &self,
        actor_id: &str,
        endpoint: &str,
    ) -> Result<RateDecision, ApiError> {
        let now = Utc::now();

        if self.exemptions.is_exempt(actor_id) {
            return Ok(RateDecision {
                allowed: true,
                remaining: self.config.max_calls,
                reset_at: now,
                blocked: false,
            });
        }

        if let Some(blocked_until) = self.active_block(actor_id).await? {
            counter!("rate_limiter_denied_total", &[("reason", "blocked")]).increment(1);
            return Ok(RateDecision {
                allowed: false,
                remaining: 0,
                reset_at: blocked_until,
                blocked: true,
            });
        }

        let key = format!("rl:{actor_id}:{endpoint}");
        let window = self
            .counters
            .increment_with_ttl(&key, Duration::from_secs(self.config.window_seconds));

        if window.count > self.config.max_calls {
            counter!("rate_limiter_denied_total", &[("reason", "window")]).increment(1);
            let blocked_until = self
                .record_violation(actor_id, endpoint, window, now)
                .await?;

            return Ok(RateDecision {
                allowed: false,
                remaining: 0,
                reset_at: blocked_until.unwrap_or(window.expires_at),
                blocked: blocked_until.is_some(),
            });
        }

        Ok(RateDecision {
            allowed: true,
            remaining: self.config.max_calls - window.count,
            reset_at: window.expires_at,
            blocked: false,
        })
    }

    /// Raise an alert for one violation and escalate to a hard block when
    /// the actor keeps tripping the limiter within the rolling period.
    async fn record_violation(
        &self,
        actor_id: &str,
        endpoint: &str,
        window: WindowCount,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>, ApiError> {
        let overage = window.count - self.config.max_calls;
        let severity = violation_severity(overage);

        warn!(
            actor_id = %actor_id,
            endpoint = %endpoint,
            count = window.count,
            max_calls = self.config.max_calls,
            "Rate limit exceeded"
        );

        self.security
            .insert_alert(
                actor_id,
                severity,
                ALERT_TYPE_RATE_LIMIT,
                &format!(
                    "rate limit exceeded: {}/{} calls to {} within {}s",
                    window.count, self.config.max_calls, endpoint, self.config.window_seconds
                ),
            )
            .await?;

        let since = now - ChronoDuration::seconds(self.config.violation_window_seconds as i64);
        let violations = self
            .security
            .alert_count_since(actor_id, ALERT_TYPE_RATE_LIMIT, since)
            .await?;

        if violations >= u64::from(self.config.max_violations) {
            let blocked_until = now + ChronoDuration::minutes(self.config.block_minutes as i64);
            let reason = format!(
                "{} rate limit violations within {}s",
                violations, self.config.violation_window_seconds
            );

            self.security
                .upsert_block(actor_id, &reason, blocked_until)
                .await?;
            self.security
                .insert_alert(actor_id, SEVERITY_CRITICA, ALERT_TYPE_BLOCK, &reason)
                .await?;
            counter!("rate_limiter_blocks_total").increment(1);

            return Ok(Some(blocked_until));
        }

        Ok(None)
    }

    /// Manually lift an actor's block (admin console).
    pub async fn unblock(&self, actor_id: &str) -> Result<bool, ApiError> {
        let removed = self.security.remove_block(actor_id).await?;
        if removed {
            self.security
                .insert_alert(
                    actor_id,
                    SEVERITY_BAIXA,
                    ALERT_TYPE_UNBLOCK,
                    "actor unblocked manually",
                )
                .await?;
        }
        Ok(removed)
    }
}

fn violation_severity(overage: u32) -> &'static str {
    match overage {
        0..=2 => SEVERITY_MEDIA,
        3..=5 => SEVERITY_ALTA,
        _ => SEVERITY_CRITICA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_store_counts_within_window() {
        let store = InMemoryCounterStore::new(16);
        let ttl = Duration::from_secs(60);

        assert_eq!(store.increment_with_ttl("k", ttl).count, 1);
        assert_eq!(store.increment_with_ttl("k", ttl).count, 2);
        assert_eq!(store.increment_with_ttl("other", ttl).count, 1);
    }

    #[tokio::test]
    async fn counter_store_resets_after_expiry() {
        let store = InMemoryCounterStore::new(16);
        let ttl = Duration::from_millis(50);

        assert_eq!(store.increment_with_ttl("k", ttl).count, 1);
        assert_eq!(store.increment_with_ttl("k", ttl).count, 2);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.increment_with_ttl("k", ttl).count, 1);
    }

    #[test]
    fn remaining_ttl_is_none_for_expired_windows() {
        let store = InMemoryCounterStore::new(16);
        assert!(store.remaining_ttl("missing").is_none());

        store.increment_with_ttl("k", Duration::from_secs(30));
        let ttl = store.remaining_ttl("k").unwrap();
        assert!(ttl <= Duration::from_secs(30));
    }

    #[test]
    fn severity_scales_with_overage() {
        assert_eq!(violation_severity(1), SEVERITY_MEDIA);
        assert_eq!(violation_severity(4), SEVERITY_ALTA);
        assert_eq!(violation_severity(9), SEVERITY_CRITICA);
    }

    #[test]
    fn admin_exemptions_match_configured_actors() {
        let exemptions = AdminExemptions::new(vec!["admin".to_string()]);
        assert!(exemptions.is_exempt("admin"));
        assert!(!exemptions.is_exempt("alice"));
    }
}
