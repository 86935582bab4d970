use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CachedRecord;

/// Bump whenever the persisted shape of `CachedRecord` or
/// `PartitionCacheEntry` changes; older entries are then discarded on read.
pub const CACHE_SCHEMA_VERSION: &str = "1.2.0";

/// Entries older than a day are treated as absent.
/// The reference data changes rarely; a day keeps list views fast without
/// hiding new releases for long.
pub const CACHE_TTL_HOURS: i64 = 24;

/// Hard cap on live partitions.
pub const MAX_CACHED_PARTITIONS: usize = 5;

/// Highest valid partition key (0 = miscellaneous, 1..=9 = generations)
pub const MAX_PARTITION_KEY: PartitionKey = 9;

pub type PartitionKey = u8;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub schema_version: String,
    pub ttl: Duration,
    pub max_partitions: usize,
    /// Prefix for the storage keys holding the entry and index blobs
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION.to_string(),
            ttl: Duration::hours(CACHE_TTL_HOURS),
            max_partitions: MAX_CACHED_PARTITIONS,
            key_prefix: "dexcache".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn entries_key(&self) -> String {
        format!("{}:partitions", self.key_prefix)
    }

    pub fn meta_key(&self) -> String {
        format!("{}:meta", self.key_prefix)
    }

    pub fn record_key(&self, id: u32) -> String {
        format!("{}:record:{}", self.key_prefix, id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionCacheEntry {
    pub records: Vec<CachedRecord>,
    pub has_more: bool,
    pub cursor: Option<String>,
    pub loaded_count: usize,
    pub timestamp: DateTime<Utc>,
    pub schema_version: String,
}

impl PartitionCacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) >= ttl
    }

    pub fn is_valid(&self, now: DateTime<Utc>, config: &CacheConfig) -> bool {
        self.schema_version == config.schema_version && !self.is_expired(now, config.ttl)
    }

    pub fn highest_id(&self) -> Option<u32> {
        self.records.iter().map(|r| r.id).max()
    }

    /// Structural check applied to entries read back from storage
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::with_capacity(self.records.len());
        for record in &self.records {
            if !seen.insert(record.id) {
                return Err(format!("duplicate record id {}", record.id));
            }
        }
        if self.schema_version.is_empty() {
            return Err("missing schema version".to_string());
        }
        Ok(())
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let minutes = self.age(now).num_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// LRU and size bookkeeping. Never consulted for lookup correctness.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheIndexMeta {
    pub last_accessed: BTreeMap<PartitionKey, DateTime<Utc>>,
    pub total_size_bytes: usize,
}

impl CacheIndexMeta {
    pub fn touch(&mut self, partition: PartitionKey, at: DateTime<Utc>) {
        self.last_accessed.insert(partition, at);
    }

    pub fn forget(&mut self, partition: PartitionKey) {
        self.last_accessed.remove(&partition);
    }

    /// Least recently accessed partitions among `candidates`, oldest first.
    /// Partitions with no recorded access sort before everything else.
    pub fn lru_order(
        &self,
        candidates: impl IntoIterator<Item = PartitionKey>,
    ) -> Vec<PartitionKey> {
        let mut keyed: Vec<(Option<DateTime<Utc>>, PartitionKey)> = candidates
            .into_iter()
            .map(|p| (self.last_accessed.get(&p).copied(), p))
            .collect();
        keyed.sort();
        keyed.into_iter().map(|(_, p)| p).collect()
    }
}
