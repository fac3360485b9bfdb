//! Periodic retention sweep for rate-limit buckets.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::ratelimit::{RateLimiter, SweepReport};

/// Runs `RateLimiter::sweep` on a fixed interval.
pub struct Sweeper {
    limiter: Arc<RateLimiter>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        Self { limiter, interval }
    }

    /// Run one sweep, logging failures instead of returning them.
    pub async fn sweep_once(&self) -> Option<SweepReport> {
        match self.limiter.sweep().await {
            Ok(report) => {
                if let Ok(remaining) = self.limiter.record_count().await {
                    debug!(remaining, "Rate limit buckets retained");
                }
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "Rate limit retention sweep failed");
                None
            }
        }
    }

    /// Start the sweep loop on the runtime. The first sweep runs immediately.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        info!(interval_secs = self.interval.as_secs(), "Starting retention sweeper");
        let task = tokio::spawn(self.run(shutdown_rx));
        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = IntervalStream::new(interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Retention sweeper received shutdown");
                    break;
                }
                tick = ticks.next() => {
                    if tick.is_none() {
                        break;
                    }
                    self.sweep_once().await;
                }
            }
        }
    }
}

/// Handle to a running sweeper.
pub struct SweeperHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the loop and wait for the in-flight sweep, if any, to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Retention sweeper task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitingConfig;
    use crate::ratelimit::{ManualClock, MemoryStore, SystemClock, UnavailableStore};
    use chrono::{TimeZone, Utc};

    fn limiter_with_stale_bucket() -> (Arc<RateLimiter>, Arc<ManualClock>) {
        let today = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(today - chrono::Duration::days(10)));
        let limiter = Arc::new(RateLimiter::with_parts(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            &RateLimitingConfig::default(),
        ));
        (limiter, clock)
    }

    #[tokio::test]
    async fn test_sweep_once_reports_deleted() {
        let (limiter, clock) = limiter_with_stale_bucket();
        limiter.consume("old").await.unwrap();
        clock.advance(chrono::Duration::days(10));
        limiter.consume("new").await.unwrap();

        let sweeper = Sweeper::new(limiter.clone(), Duration::from_secs(60));
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report.deleted_count, 1);
        assert_eq!(limiter.record_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_runs_and_stops() {
        let (limiter, clock) = limiter_with_stale_bucket();
        limiter.consume("old").await.unwrap();
        clock.advance(chrono::Duration::days(10));

        let handle = Sweeper::new(limiter.clone(), Duration::from_millis(10)).spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop().await;

        assert_eq!(limiter.record_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_once_survives_store_failure() {
        let limiter = Arc::new(RateLimiter::with_parts(
            Arc::new(UnavailableStore),
            Arc::new(SystemClock),
            &RateLimitingConfig::default(),
        ));

        let sweeper = Sweeper::new(limiter, Duration::from_secs(60));
        assert!(sweeper.sweep_once().await.is_none());
    }
}
