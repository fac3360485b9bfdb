//! Day buckets and the clock they are computed from.
//!
//! Every rate-limit decision is scoped to a `(identifier, day)` bucket. Days
//! are UTC calendar days, and the reset time reported to callers is the last
//! millisecond of the same UTC day, so the bucket key and the reset time never
//! disagree around midnight.

use chrono::{DateTime, Days, NaiveDate, Utc};
use parking_lot::Mutex;
use std::fmt;

/// Milliseconds in one UTC day.
const DAY_MILLIS: i64 = 86_400_000;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// The UTC calendar day containing `now`.
pub fn day_of(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

/// Epoch milliseconds of 23:59:59.999 UTC on the day containing `now`.
pub fn end_of_day_millis(now: DateTime<Utc>) -> i64 {
    let start = now.timestamp_millis().div_euclid(DAY_MILLIS) * DAY_MILLIS;
    start + DAY_MILLIS - 1
}

/// Oldest day still retained when `today` keeps `retention_days` of history.
///
/// Buckets strictly older than the returned day are eligible for deletion.
pub fn retention_cutoff(today: NaiveDate, retention_days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(retention_days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Composite key of one counter bucket.
///
/// Ordered by identifier first, then by day.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub identifier: String,
    pub day: NaiveDate,
}

impl BucketKey {
    pub fn new(identifier: impl Into<String>, day: NaiveDate) -> Self {
        Self {
            identifier: identifier.into(),
            day,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identifier, self.day.format("%Y-%m-%d"))
    }
}
