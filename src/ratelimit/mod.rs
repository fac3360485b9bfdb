//! Daily rate limiting: day buckets, counter storage, and the limiter itself.

mod bucket;
mod limiter;
mod store;

pub use bucket::{day_of, end_of_day_millis, retention_cutoff, BucketKey, Clock, ManualClock, SystemClock};
pub use limiter::{Decision, RateLimiter, Snapshot, SweepReport};
pub use store::{CounterStore, IncrementOutcome, MemoryStore, RateLimitRecord};

#[cfg(test)]
pub(crate) use store::UnavailableStore;
