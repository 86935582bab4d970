use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use super::codec::{decode_blob, encode_blob};
use super::entry::{
    CacheConfig, CacheIndexMeta, PartitionCacheEntry, PartitionKey, MAX_PARTITION_KEY,
};
use crate::clock::{Clock, SystemClock};
use crate::models::CachedRecord;
use crate::storage::{KeyValueStorage, StorageError};

/// Failures inside the cache layer. These never cross the public API;
/// they are logged and turned into misses or dropped writes.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to decode cache blob: {0}")]
    Decode(String),

    #[error("Malformed cache JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CacheError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, CacheError::Storage(e) if e.is_quota_exceeded())
    }
}

/// Number of partitions dropped to make room when storage reports a full quota
const QUOTA_EVICTION_COUNT: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub cached_partitions: Vec<PartitionKey>,
    pub total_size_bytes: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Ids held by valid cache entries at one point in time.
#[derive(Debug, Clone, Default)]
pub struct CachedIdIndex {
    by_partition: BTreeMap<PartitionKey, BTreeSet<u32>>,
}

impl CachedIdIndex {
    pub fn is_cached(&self, id: u32) -> bool {
        self.by_partition.values().any(|ids| ids.contains(&id))
    }

    pub fn highest_known_id(&self, partition: PartitionKey) -> Option<u32> {
        self.by_partition
            .get(&partition)
            .and_then(|ids| ids.iter().next_back().copied())
    }

    pub fn len(&self) -> usize {
        self.by_partition.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type Entries = BTreeMap<PartitionKey, PartitionCacheEntry>;

/// Partition cache over a key/value storage primitive.
///
/// The whole entry collection is stored as one blob and every operation is a
/// read-modify-write of that blob. The index lock serializes operations within
/// a process, so concurrent writers to the same partition resolve to the last
/// write.
pub struct CacheStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    meta: Mutex<CacheIndexMeta>,
}

impl CacheStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, config: CacheConfig) -> Self {
        Self::with_clock(storage, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        storage: Arc<dyn KeyValueStorage>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let meta = load_meta(storage.as_ref(), &config);
        Self {
            storage,
            clock,
            config,
            meta: Mutex::new(meta),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Current time on the store's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ===== Public contract =====

    /// Fetch a partition entry, or `None` on miss.
    ///
    /// Invalid entries (other schema version, or past TTL) are deleted and
    /// reported as a miss.
    pub fn get(&self, partition: PartitionKey) -> Option<PartitionCacheEntry> {
        let mut meta = self.lock_meta();
        let now = self.clock.now();
        let mut entries = self.load_entries();

        let entry = entries.get(&partition)?;
        if !entry.is_valid(now, &self.config) {
            debug!(
                partition,
                version = %entry.schema_version,
                age_minutes = entry.age(now).num_minutes(),
                "Discarding invalid cache entry"
            );
            entries.remove(&partition);
            meta.forget(partition);
            if let Err(e) = self.persist(&entries, &mut meta) {
                warn!(partition, error = %e, "Failed to remove invalid cache entry");
            }
            return None;
        }

        let entry = entry.clone();
        meta.touch(partition, now);
        self.save_meta(&meta);
        Some(entry)
    }

    /// Replace a partition entry with freshly fetched records.
    pub fn put(
        &self,
        partition: PartitionKey,
        records: Vec<CachedRecord>,
        has_more: bool,
        cursor: Option<String>,
        loaded_count: usize,
    ) {
        if partition > MAX_PARTITION_KEY {
            warn!(partition, "Refusing to cache unknown partition");
            return;
        }

        let records = dedupe_records(partition, records);

        let mut meta = self.lock_meta();
        let now = self.clock.now();
        let mut entries = self.load_entries();

        entries.insert(
            partition,
            PartitionCacheEntry {
                records,
                has_more,
                cursor,
                loaded_count,
                timestamp: now,
                schema_version: self.config.schema_version.clone(),
            },
        );
        meta.touch(partition, now);

        while entries.len() > self.config.max_partitions {
            match self.evict_lru(&mut entries, &mut meta, partition, 1).first() {
                Some(evicted) => debug!(partition = evicted, "Evicted partition over cap"),
                None => break,
            }
        }

        let err = match self.persist(&entries, &mut meta) {
            Ok(()) => return,
            Err(e) => e,
        };
        if !err.is_quota_exceeded() {
            warn!(partition, error = %err, "Cache write failed, dropping");
            return;
        }

        let evicted = self.evict_lru(&mut entries, &mut meta, partition, QUOTA_EVICTION_COUNT);
        debug!(partition, ?evicted, "Storage quota exceeded, evicted and retrying");
        if let Err(e) = self.persist(&entries, &mut meta) {
            warn!(partition, error = %e, "Cache write failed after eviction, dropping");
            // Keep the evictions but make sure a stale copy of this partition
            // cannot answer the next read
            entries.remove(&partition);
            meta.forget(partition);
            if let Err(e) = self.persist(&entries, &mut meta) {
                debug!(partition, error = %e, "Could not persist reduced cache");
            }
        }
    }

    pub fn invalidate(&self, partition: PartitionKey) {
        let mut meta = self.lock_meta();
        let mut entries = self.load_entries();
        entries.remove(&partition);
        meta.forget(partition);
        if let Err(e) = self.persist(&entries, &mut meta) {
            warn!(partition, error = %e, "Failed to persist invalidation");
        }
    }

    pub fn clear(&self) {
        let mut meta = self.lock_meta();
        *meta = CacheIndexMeta::default();
        for key in [self.config.entries_key(), self.config.meta_key()] {
            if let Err(e) = self.storage.remove(&key) {
                warn!(key = %key, error = %e, "Failed to clear cache key");
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let meta = self.lock_meta();
        CacheStats {
            cached_partitions: meta.last_accessed.keys().copied().collect(),
            total_size_bytes: meta.total_size_bytes,
            oldest: meta.last_accessed.values().min().copied(),
            newest: meta.last_accessed.values().max().copied(),
        }
    }

    // ===== Read-only queries (do not count as access) =====

    /// Highest record id held for a partition, if a valid entry exists.
    pub fn highest_known_id(&self, partition: PartitionKey) -> Option<u32> {
        self.peek(partition).and_then(|e| e.highest_id())
    }

    pub fn contains_id(&self, partition: PartitionKey, id: u32) -> bool {
        self.find_record(partition, id).is_some()
    }

    /// One record from a valid entry, without touching the LRU order.
    pub fn find_record(&self, partition: PartitionKey, id: u32) -> Option<CachedRecord> {
        self.peek(partition)
            .and_then(|e| e.records.into_iter().find(|r| r.id == id))
    }

    /// Snapshot of every id held by a valid entry.
    pub fn cached_id_index(&self) -> CachedIdIndex {
        let _meta = self.lock_meta();
        let now = self.clock.now();
        let by_partition = self
            .load_entries()
            .into_iter()
            .filter(|(_, e)| e.is_valid(now, &self.config))
            .map(|(p, e)| (p, e.records.iter().map(|r| r.id).collect()))
            .collect();
        CachedIdIndex { by_partition }
    }

    fn peek(&self, partition: PartitionKey) -> Option<PartitionCacheEntry> {
        let _meta = self.lock_meta();
        let now = self.clock.now();
        self.load_entries()
            .remove(&partition)
            .filter(|e| e.is_valid(now, &self.config))
    }

    // ===== Persistence =====

    fn lock_meta(&self) -> MutexGuard<'_, CacheIndexMeta> {
        self.meta.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Read and validate the entry collection. Any failure reads as empty.
    fn load_entries(&self) -> Entries {
        let key = self.config.entries_key();
        let raw = match self.storage.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Entries::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read cache blob");
                return Entries::new();
            }
        };

        match parse_entries(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable cache blob");
                Entries::new()
            }
        }
    }

    fn persist(&self, entries: &Entries, meta: &mut CacheIndexMeta) -> Result<(), CacheError> {
        let json = serde_json::to_string(entries)?;
        let blob = encode_blob(&json);
        self.storage.set(&self.config.entries_key(), &blob)?;
        meta.total_size_bytes = blob.len();
        self.save_meta(meta);
        Ok(())
    }

    fn save_meta(&self, meta: &CacheIndexMeta) {
        let result = serde_json::to_string(meta)
            .map_err(CacheError::from)
            .and_then(|json| {
                self.storage
                    .set(&self.config.meta_key(), &encode_blob(&json))
                    .map_err(CacheError::from)
            });
        if let Err(e) = result {
            debug!(error = %e, "Failed to persist cache index");
        }
    }

    /// Remove up to `count` least recently accessed partitions, never `keep`.
    fn evict_lru(
        &self,
        entries: &mut Entries,
        meta: &mut CacheIndexMeta,
        keep: PartitionKey,
        count: usize,
    ) -> Vec<PartitionKey> {
        let victims: Vec<PartitionKey> = meta
            .lru_order(entries.keys().copied().filter(|&p| p != keep))
            .into_iter()
            .take(count)
            .collect();
        for p in &victims {
            entries.remove(p);
            meta.forget(*p);
        }
        victims
    }
}

/// Keep the first record for each id. An entry holding a repeated id would
/// fail validation on every read.
fn dedupe_records(partition: PartitionKey, records: Vec<CachedRecord>) -> Vec<CachedRecord> {
    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    let records: Vec<CachedRecord> = records.into_iter().filter(|r| seen.insert(r.id)).collect();
    if records.len() < before {
        warn!(partition, dropped = before - records.len(), "Dropping duplicate record ids");
    }
    records
}

fn parse_entries(raw: &str) -> Result<Entries, CacheError> {
    let json = decode_blob(raw)?;
    let loose: BTreeMap<String, serde_json::Value> = serde_json::from_str(&json)?;

    let mut entries = Entries::new();
    for (key, value) in loose {
        let partition = match key.parse::<PartitionKey>() {
            Ok(p) if p <= MAX_PARTITION_KEY => p,
            _ => {
                warn!(key = %key, "Skipping cache entry with unknown partition key");
                continue;
            }
        };
        let entry: PartitionCacheEntry = match serde_json::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(partition, error = %e, "Skipping malformed cache entry");
                continue;
            }
        };
        if let Err(reason) = entry.validate() {
            warn!(partition, reason = %reason, "Skipping inconsistent cache entry");
            continue;
        }
        entries.insert(partition, entry);
    }
    Ok(entries)
}

fn load_meta(storage: &dyn KeyValueStorage, config: &CacheConfig) -> CacheIndexMeta {
    let raw = match storage.get(&config.meta_key()) {
        Ok(Some(raw)) => raw,
        Ok(None) => return CacheIndexMeta::default(),
        Err(e) => {
            warn!(error = %e, "Failed to read cache index");
            return CacheIndexMeta::default();
        }
    };
    decode_blob(&raw)
        .and_then(|json| serde_json::from_str(&json).map_err(CacheError::from))
        .unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable cache index");
            CacheIndexMeta::default()
        })
}

// ============================================================================
// Tests
// ============================================================================
