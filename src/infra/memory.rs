//! In-memory metadata store, for tests and embedded deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::warn;

use crate::application::stores::{RecordStore, StoreError};
use crate::domain::record::{CacheKey, CacheRecord, UsageEvent};

/// DashMap-backed [`RecordStore`] enforcing the same key-uniqueness and
/// usage-log semantics as the Postgres backend.
#[derive(Default)]
pub struct MemRecordStore {
    records: DashMap<String, CacheRecord>,
    usage: DashMap<String, Vec<UsageEvent>>,
}

impl MemRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemRecordStore {
    async fn find(&self, key: &CacheKey) -> Result<Option<CacheRecord>, StoreError> {
        Ok(self.records.get(key.as_str()).map(|entry| entry.value().clone()))
    }

    async fn insert(&self, record: CacheRecord) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;

        match self.records.entry(record.key.as_str().to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(())
            }
            Entry::Occupied(_) => Err(StoreError::Duplicate { key: record.key }),
        }
    }

    async fn increment_usage(&self, key: &CacheKey) -> Result<(), StoreError> {
        if !self.records.contains_key(key.as_str()) {
            warn!(key = %key, "usage increment for unknown cache key ignored");
            return Ok(());
        }

        self.usage
            .entry(key.as_str().to_owned())
            .or_default()
            .push(UsageEvent {
                record_key: key.clone(),
                recorded_at: OffsetDateTime::now_utc(),
            });
        Ok(())
    }

    async fn usage_count(&self, key: &CacheKey) -> Result<u64, StoreError> {
        Ok(self
            .usage
            .get(key.as_str())
            .map(|events| events.len() as u64)
            .unwrap_or(0))
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StoreError> {
        self.records.remove(key.as_str());
        self.usage.remove(key.as_str());
        Ok(())
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<(), StoreError> {
        let keys: Vec<String> = self
            .records
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.key().clone())
            .collect();

        for key in keys {
            self.records.remove(&key);
            self.usage.remove(&key);
        }
        Ok(())
    }
}
