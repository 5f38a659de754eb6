//! Event persistence used by the indexing engine

use std::{
    collections::BTreeMap,
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use eyre::{Result, eyre};

use crate::models::{EventCountRow, EventKey, EventRecord};

/// Idempotent event persistence keyed by `(tx_hash, log_index)`.
#[async_trait]
pub trait EventStore: Send + Sync + std::fmt::Debug {
    /// Insert `record` or replace the stored record with the same key.
    ///
    /// The stored record is unprocessed and carries a fresh version; it is returned.
    async fn upsert(&self, record: EventRecord) -> Result<EventRecord>;

    /// Flag the record with `key` as handled by its processor.
    async fn mark_processed(&self, key: &EventKey) -> Result<()>;

    /// Highest block number of any stored record, `None` when the store is empty.
    async fn max_block_number(&self) -> Result<Option<u64>>;

    /// Oldest records whose processor has not succeeded yet.
    async fn unprocessed(&self, limit: u64) -> Result<Vec<EventRecord>>;

    /// Per event name, how many records exist and how many are processed.
    async fn event_counts(&self) -> Result<Vec<EventCountRow>>;
}

/// Strictly increasing row versions based on the wall clock in microseconds.
#[derive(Debug, Default)]
pub struct VersionClock(AtomicU64);

impl VersionClock {
    /// Next version; greater than every version returned before.
    pub fn next(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
        let prev = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| Some(now.max(prev + 1)))
            .unwrap_or_else(|prev| prev);
        now.max(prev + 1)
    }
}

/// [`EventStore`] kept in process memory. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    records: Mutex<BTreeMap<EventKey, EventRecord>>,
    clock: VersionClock,
}

impl MemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the stored record with `key`.
    pub fn get(&self, key: &EventKey) -> Option<EventRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the store holds no record.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records ordered by key.
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).values().cloned().collect()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn upsert(&self, mut record: EventRecord) -> Result<EventRecord> {
        record.processed = false;
        record.version = self.clock.next();
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.key(), record.clone());
        Ok(record)
    }

    async fn mark_processed(&self, key: &EventKey) -> Result<()> {
        let version = self.clock.next();
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = records.get_mut(key).ok_or_else(|| {
            eyre!("no event for tx {} log {}", key.tx_hash.to_hex(), key.log_index)
        })?;
        record.processed = true;
        record.version = version;
        Ok(())
    }

    async fn max_block_number(&self) -> Result<Option<u64>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().map(|record| record.block_number).max())
    }

    async fn unprocessed(&self, limit: u64) -> Result<Vec<EventRecord>> {
        let mut pending: Vec<_> = self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|record| !record.processed)
            .cloned()
            .collect();
        pending.sort_by_key(|record| (record.block_number, record.log_index));
        pending.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(pending)
    }

    async fn event_counts(&self) -> Result<Vec<EventCountRow>> {
        let mut counts: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for record in self.records.lock().unwrap_or_else(PoisonError::into_inner).values() {
            let entry = counts.entry(record.event_name.clone()).or_default();
            entry.0 += 1;
            entry.1 += u64::from(record.processed);
        }
        Ok(counts
            .into_iter()
            .map(|(event_name, (total, processed))| EventCountRow { event_name, total, processed })
            .collect())
    }
}
