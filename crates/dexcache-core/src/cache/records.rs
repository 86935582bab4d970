//! Single-record cache keyed by id.
//!
//! Records fetched one at a time (by the preloader, or a detail lookup) are
//! kept here so a later process can answer them without the network. Each
//! record is its own storage key and follows the same TTL and schema rules as
//! partition entries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::codec::{decode_blob, encode_blob};
use super::entry::CacheConfig;
use super::store::CacheError;
use crate::clock::{Clock, SystemClock};
use crate::models::CachedRecord;
use crate::storage::KeyValueStorage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredRecord {
    record: CachedRecord,
    timestamp: DateTime<Utc>,
    schema_version: String,
}

pub struct RecordCache {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
}

impl RecordCache {
    pub fn new(storage: Arc<dyn KeyValueStorage>, config: CacheConfig) -> Self {
        Self::with_clock(storage, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        storage: Arc<dyn KeyValueStorage>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            clock,
            config,
        }
    }

    /// The cached record, or `None` when absent, stale or unreadable.
    /// Stale and unreadable records are removed.
    pub fn get(&self, id: u32) -> Option<CachedRecord> {
        let raw = match self.storage.get(&self.config.record_key(id)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(id, error = %e, "Failed to read cached record");
                return None;
            }
        };

        let stored = match parse_record(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(id, error = %e, "Discarding unreadable cached record");
                self.remove(id);
                return None;
            }
        };

        let age = self.clock.now() - stored.timestamp;
        if stored.record.id != id
            || stored.schema_version != self.config.schema_version
            || age >= self.config.ttl
        {
            debug!(id, version = %stored.schema_version, "Discarding stale cached record");
            self.remove(id);
            return None;
        }
        Some(stored.record)
    }

    /// Store a record. Failures, quota included, are logged and dropped.
    pub fn put(&self, record: &CachedRecord) {
        let stored = StoredRecord {
            record: record.clone(),
            timestamp: self.clock.now(),
            schema_version: self.config.schema_version.clone(),
        };
        let result = serde_json::to_string(&stored)
            .map_err(CacheError::from)
            .and_then(|json| {
                self.storage
                    .set(&self.config.record_key(record.id), &encode_blob(&json))
                    .map_err(CacheError::from)
            });

        match result {
            Ok(()) => {}
            Err(e) if e.is_quota_exceeded() => {
                debug!(id = record.id, "Record cache full, dropping record")
            }
            Err(e) => warn!(id = record.id, error = %e, "Failed to cache record"),
        }
    }

    pub fn remove(&self, id: u32) {
        if let Err(e) = self.storage.remove(&self.config.record_key(id)) {
            debug!(id, error = %e, "Failed to remove cached record");
        }
    }
}

fn parse_record(raw: &str) -> Result<StoredRecord, CacheError> {
    let json = decode_blob(raw)?;
    Ok(serde_json::from_str(&json)?)
}
