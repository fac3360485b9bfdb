//! Counter store abstraction and the in-process implementation.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;
use uuid::Uuid;

use super::bucket::BucketKey;
use crate::error::Result;

/// One row per identifier per UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRecord {
    /// Row id assigned at insert
    pub id: Uuid,
    pub identifier: String,
    /// Day bucket, serialized as `YYYY-MM-DD`
    pub date: NaiveDate,
    pub request_count: u32,
    /// Epoch milliseconds of the most recent counted attempt
    pub last_request_time: i64,
}

/// Result of the atomic increment-or-insert primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// No record existed; one was inserted with a count of 1.
    Created(RateLimitRecord),
    /// The record was below the limit and has been incremented.
    Incremented(RateLimitRecord),
    /// The record already reached the limit and was left untouched.
    Saturated(RateLimitRecord),
}

impl IncrementOutcome {
    pub fn record(&self) -> &RateLimitRecord {
        match self {
            IncrementOutcome::Created(r)
            | IncrementOutcome::Incremented(r)
            | IncrementOutcome::Saturated(r) => r,
        }
    }

    pub fn is_saturated(&self) -> bool {
        matches!(self, IncrementOutcome::Saturated(_))
    }
}

/// Storage for rate-limit buckets.
///
/// Implementations must run `increment_below` as a single atomic
/// read-modify-write per key so that concurrent first attempts for the same
/// bucket cannot both insert.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Exact lookup of one bucket.
    async fn get(&self, key: &BucketKey) -> Result<Option<RateLimitRecord>>;

    /// Insert the bucket with a count of 1 if absent, otherwise increment it
    /// unless its count is already at `limit`. `limit` must be at least 1.
    async fn increment_below(
        &self,
        key: &BucketKey,
        limit: u32,
        now_ms: i64,
    ) -> Result<IncrementOutcome>;

    /// Delete every bucket whose day is strictly before `cutoff`.
    async fn delete_before(&self, cutoff: NaiveDate) -> Result<usize>;

    /// Number of stored buckets.
    async fn record_count(&self) -> Result<usize>;
}

#[derive(Debug, Default)]
struct Tables {
    records: BTreeMap<BucketKey, RateLimitRecord>,
    /// Secondary index on day alone, used for range deletion
    by_day: BTreeMap<NaiveDate, BTreeSet<String>>,
}

/// In-process counter store.
///
/// All mutations happen under one write lock, which makes
/// `increment_below` atomic across tasks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &BucketKey) -> Result<Option<RateLimitRecord>> {
        Ok(self.tables.read().records.get(key).cloned())
    }

    async fn increment_below(
        &self,
        key: &BucketKey,
        limit: u32,
        now_ms: i64,
    ) -> Result<IncrementOutcome> {
        let mut tables = self.tables.write();
        let Tables { records, by_day } = &mut *tables;

        let outcome = match records.get_mut(key) {
            Some(record) if record.request_count >= limit => {
                IncrementOutcome::Saturated(record.clone())
            }
            Some(record) => {
                record.request_count += 1;
                record.last_request_time = now_ms;
                IncrementOutcome::Incremented(record.clone())
            }
            None => {
                let record = RateLimitRecord {
                    id: Uuid::new_v4(),
                    identifier: key.identifier.clone(),
                    date: key.day,
                    request_count: 1,
                    last_request_time: now_ms,
                };
                by_day
                    .entry(key.day)
                    .or_default()
                    .insert(key.identifier.clone());
                records.insert(key.clone(), record.clone());
                IncrementOutcome::Created(record)
            }
        };

        trace!(key = %key, count = outcome.record().request_count, "Bucket updated");
        Ok(outcome)
    }

    async fn delete_before(&self, cutoff: NaiveDate) -> Result<usize> {
        let mut tables = self.tables.write();

        let retained = tables.by_day.split_off(&cutoff);
        let expired = std::mem::replace(&mut tables.by_day, retained);

        let mut deleted = 0;
        for (day, identifiers) in expired {
            for identifier in identifiers {
                if tables.records.remove(&BucketKey { identifier, day }).is_some() {
                    deleted += 1;
                }
            }
        }

        Ok(deleted)
    }

    async fn record_count(&self) -> Result<usize> {
        Ok(self.tables.read().records.len())
    }
}

/// Store whose every read and write fails, for exercising error paths.
#[cfg(test)]
pub(crate) struct UnavailableStore;

#[cfg(test)]
#[async_trait]
impl CounterStore for UnavailableStore {
    async fn get(&self, _key: &BucketKey) -> Result<Option<RateLimitRecord>> {
        Err(crate::error::HookgateError::Storage("connection refused".to_string()))
    }

    async fn increment_below(
        &self,
        _key: &BucketKey,
        _limit: u32,
        _now_ms: i64,
    ) -> Result<IncrementOutcome> {
        Err(crate::error::HookgateError::Storage("connection refused".to_string()))
    }

    async fn delete_before(&self, _cutoff: NaiveDate) -> Result<usize> {
        Err(crate::error::HookgateError::Storage("connection refused".to_string()))
    }

    async fn record_count(&self) -> Result<usize> {
        Err(crate::error::HookgateError::Storage("connection refused".to_string()))
    }
}
