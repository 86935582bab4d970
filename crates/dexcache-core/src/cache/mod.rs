//! Versioned, size-bounded partition cache.
//!
//! This module provides the `CacheStore` for keeping one compressed record
//! list per partition in a [`KeyValueStorage`](crate::storage::KeyValueStorage).
//!
//! - Entries expire after the configured TTL (24 hours by default)
//! - Entries written under another schema version are discarded on read
//! - At most five partitions are kept; the least recently accessed goes first
//! - Records fetched one by one live in a separate [`RecordCache`] under the
//!   same TTL and schema rules
//! - Storage failures are absorbed: callers see a value or a miss, never an error

pub mod codec;
pub mod entry;
pub mod records;
pub mod store;

pub use entry::{
    CacheConfig, CacheIndexMeta, PartitionCacheEntry, PartitionKey, CACHE_SCHEMA_VERSION,
    CACHE_TTL_HOURS, MAX_CACHED_PARTITIONS,
};
pub use records::RecordCache;
pub use store::{CacheError, CacheStats, CacheStore, CachedIdIndex};
