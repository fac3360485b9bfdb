//! Core daily rate limiter.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace};

use super::bucket::{day_of, end_of_day_millis, retention_cutoff, BucketKey, Clock, SystemClock};
use super::store::{CounterStore, IncrementOutcome, MemoryStore};
use crate::config::RateLimitingConfig;
use crate::error::Result;

/// Outcome of a `consume` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    /// Epoch milliseconds of the end of the current UTC day
    pub reset_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Read-only view of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub request_count: u32,
    pub remaining: u32,
    pub reset_time: i64,
}

/// Result of a retention sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub deleted_count: usize,
}

/// Per-identifier daily request counter.
///
/// The limiter is the only writer of its store. It is thread-safe and meant
/// to be shared behind an `Arc`.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    daily_limit: u32,
    retention_days: u32,
}

impl RateLimiter {
    /// Create a limiter over an in-process store and the system clock.
    pub fn new(config: &RateLimitingConfig) -> Self {
        Self::with_parts(Arc::new(MemoryStore::new()), Arc::new(SystemClock), config)
    }

    /// Create a limiter over the given store and clock.
    ///
    /// A configured limit of zero is raised to one.
    pub fn with_parts(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        config: &RateLimitingConfig,
    ) -> Self {
        Self {
            store,
            clock,
            daily_limit: config.daily_limit.max(1),
            retention_days: config.retention_days,
        }
    }

    /// Maximum attempts per identifier per day.
    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }

    /// Record one attempt for `identifier` and decide whether it is allowed.
    ///
    /// Denied attempts are not counted. Store failures are returned to the
    /// caller, which owns the fail-open or fail-closed policy.
    pub async fn consume(&self, identifier: &str) -> Result<Decision> {
        let now = self.clock.now();
        let key = BucketKey::new(identifier, day_of(now));
        let reset_time = end_of_day_millis(now);

        trace!(key = %key, "Consuming rate limit attempt");

        let outcome = self
            .store
            .increment_below(&key, self.daily_limit, now.timestamp_millis())
            .await?;

        let decision = match outcome {
            IncrementOutcome::Saturated(record) => {
                debug!(
                    key = %key,
                    count = record.request_count,
                    limit = self.daily_limit,
                    "Daily rate limit exceeded"
                );
                Decision {
                    allowed: false,
                    remaining: 0,
                    reset_time,
                    message: Some(format!(
                        "Daily rate limit of {} requests exceeded. Try again tomorrow.",
                        self.daily_limit
                    )),
                }
            }
            IncrementOutcome::Created(record) | IncrementOutcome::Incremented(record) => {
                Decision {
                    allowed: true,
                    remaining: self.daily_limit.saturating_sub(record.request_count),
                    reset_time,
                    message: None,
                }
            }
        };

        Ok(decision)
    }

    /// Current state of today's bucket for `identifier`. Never mutates.
    pub async fn status(&self, identifier: &str) -> Result<Snapshot> {
        let now = self.clock.now();
        let key = BucketKey::new(identifier, day_of(now));
        let request_count = self
            .store
            .get(&key)
            .await?
            .map(|record| record.request_count)
            .unwrap_or(0);

        Ok(Snapshot {
            request_count,
            remaining: self.daily_limit.saturating_sub(request_count),
            reset_time: end_of_day_millis(now),
        })
    }

    /// Delete buckets older than the retention window.
    ///
    /// Only days strictly before `today - retention_days` are removed, so the
    /// current day is never touched.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let today = day_of(self.clock.now());
        let cutoff = retention_cutoff(today, self.retention_days);

        let deleted_count = self.store.delete_before(cutoff).await?;

        info!(
            cutoff = %cutoff,
            deleted = deleted_count,
            "Rate limit retention sweep finished"
        );

        Ok(SweepReport { deleted_count })
    }

    /// Number of stored buckets.
    pub async fn record_count(&self) -> Result<usize> {
        self.store.record_count().await
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HookgateError;
    use crate::ratelimit::bucket::ManualClock;
    use crate::ratelimit::store::UnavailableStore;
    use chrono::{TimeZone, Utc};

    fn test_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap(),
        ))
    }

    fn limiter_with(clock: Arc<ManualClock>, daily_limit: u32) -> RateLimiter {
        let config = RateLimitingConfig {
            daily_limit,
            ..Default::default()
        };
        RateLimiter::with_parts(Arc::new(MemoryStore::new()), clock, &config)
    }

    #[tokio::test]
    async fn test_first_consume_is_allowed() {
        let limiter = limiter_with(test_clock(), 10);

        let decision = limiter.consume("u1").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
        assert!(decision.message.is_none());
    }

    #[tokio::test]
    async fn test_exhausting_the_daily_limit() {
        let clock = test_clock();
        let limiter = limiter_with(clock.clone(), 10);

        let mut remaining = Vec::new();
        for _ in 0..10 {
            let decision = limiter.consume("u1").await.unwrap();
            assert!(decision.allowed);
            remaining.push(decision.remaining);
        }
        assert_eq!(remaining, vec![9, 8, 7, 6, 5, 4, 3, 2, 1, 0]);

        let denied = limiter.consume("u1").await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(
            denied.message.as_deref(),
            Some("Daily rate limit of 10 requests exceeded. Try again tomorrow.")
        );

        // The next UTC day starts a fresh bucket
        clock.advance(chrono::Duration::days(1));
        let decision = limiter.consume("u1").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
    }

    #[tokio::test]
    async fn test_denied_attempts_are_not_counted() {
        let limiter = limiter_with(test_clock(), 3);

        for _ in 0..3 {
            limiter.consume("u1").await.unwrap();
        }
        for _ in 0..5 {
            assert!(!limiter.consume("u1").await.unwrap().allowed);
        }

        let snapshot = limiter.status("u1").await.unwrap();
        assert_eq!(snapshot.request_count, 3);
        assert_eq!(snapshot.remaining, 0);
    }

    #[tokio::test]
    async fn test_status_for_unknown_identifier() {
        let limiter = limiter_with(test_clock(), 10);

        let snapshot = limiter.status("nobody").await.unwrap();
        assert_eq!(snapshot.request_count, 0);
        assert_eq!(snapshot.remaining, 10);
        assert_eq!(limiter.record_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_status_is_read_only() {
        let limiter = limiter_with(test_clock(), 10);
        limiter.consume("u1").await.unwrap();
        limiter.consume("u1").await.unwrap();

        let first = limiter.status("u1").await.unwrap();
        for _ in 0..5 {
            assert_eq!(limiter.status("u1").await.unwrap(), first);
        }
        assert_eq!(first.request_count, 2);
        assert_eq!(first.remaining, 8);
    }

    #[tokio::test]
    async fn test_identifiers_are_independent() {
        let limiter = limiter_with(test_clock(), 10);

        for _ in 0..11 {
            limiter.consume("a").await.unwrap();
        }
        assert!(!limiter.consume("a").await.unwrap().allowed);

        let snapshot = limiter.status("b").await.unwrap();
        assert_eq!(snapshot.remaining, 10);
    }

    #[tokio::test]
    async fn test_reset_time_is_end_of_utc_day() {
        let limiter = limiter_with(test_clock(), 10);

        let expected = Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap().timestamp_millis() - 1;
        assert_eq!(limiter.consume("u1").await.unwrap().reset_time, expected);
        assert_eq!(limiter.status("u1").await.unwrap().reset_time, expected);
    }

    #[tokio::test]
    async fn test_empty_identifier_is_a_valid_key() {
        let limiter = limiter_with(test_clock(), 2);

        assert!(limiter.consume("").await.unwrap().allowed);
        assert_eq!(limiter.status("").await.unwrap().request_count, 1);
    }

    #[tokio::test]
    async fn test_sweep_retention_boundary() {
        let clock = test_clock();
        let limiter = limiter_with(clock.clone(), 10);
        let today = Utc.with_ymd_and_hms(2024, 6, 15, 9, 30, 0).unwrap();

        for days_ago in [8, 7, 6] {
            clock.set(today - chrono::Duration::days(days_ago));
            limiter.consume(&format!("u{}", days_ago)).await.unwrap();
        }
        clock.set(today);
        limiter.consume("today").await.unwrap();

        let report = limiter.sweep().await.unwrap();
        assert_eq!(report.deleted_count, 1);
        assert_eq!(limiter.record_count().await.unwrap(), 3);

        // Idempotent within the same day
        let report = limiter.sweep().await.unwrap();
        assert_eq!(report.deleted_count, 0);
        assert_eq!(limiter.status("today").await.unwrap().request_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_requests_share_one_bucket() {
        let limiter = Arc::new(limiter_with(test_clock(), 10));

        let tasks = (0..8).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.consume("racer").await })
        });
        let results = futures::future::join_all(tasks).await;

        let allowed = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .filter(|d| d.allowed)
            .count();
        assert_eq!(allowed, 8);
        assert_eq!(limiter.record_count().await.unwrap(), 1);
        assert_eq!(limiter.status("racer").await.unwrap().request_count, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_overshoot_is_bounded() {
        let limiter = Arc::new(limiter_with(test_clock(), 5));

        let tasks = (0..20).map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.consume("racer").await })
        });
        let allowed = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| r.as_ref().unwrap().as_ref().unwrap().allowed)
            .count();

        assert_eq!(allowed, 5);
        assert_eq!(limiter.status("racer").await.unwrap().request_count, 5);
    }

    #[tokio::test]
    async fn test_storage_failures_propagate() {
        let limiter = RateLimiter::with_parts(
            Arc::new(UnavailableStore),
            test_clock(),
            &RateLimitingConfig::default(),
        );

        assert!(matches!(limiter.consume("u1").await, Err(HookgateError::Storage(_))));
        assert!(matches!(limiter.status("u1").await, Err(HookgateError::Storage(_))));
        assert!(matches!(limiter.sweep().await, Err(HookgateError::Storage(_))));
    }

    #[test]
    fn test_decision_serialization() {
        let decision = Decision {
            allowed: true,
            remaining: 3,
            reset_time: 99,
            message: None,
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json, serde_json::json!({"allowed": true, "remaining": 3, "resetTime": 99}));
    }
}
