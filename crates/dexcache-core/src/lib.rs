//! Client-side cache and predictive prefetcher for the creature dataset.
//!
//! The dataset is split into partitions: nine generations keyed 1-9 and a
//! misc partition keyed 0 for alternate forms. This crate provides:
//!
//! - `CacheStore`: versioned, TTL-bounded, LRU-capped partition cache over a
//!   pluggable key-value storage
//! - `compress`/`decompress`: the compact record form kept in the cache
//! - `PreloadScheduler`: background fetching of likely next records
//! - `NetworkConditionMonitor`: suppresses preloading on slow links
//! - `load_partition`: cache-first partition reads against a `DataSource`

pub mod cache;
pub mod catalog;
pub mod clock;
pub mod compress;
pub mod loader;
pub mod models;
pub mod network;
pub mod preload;
pub mod source;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{
    CacheConfig, CacheStats, CacheStore, PartitionCacheEntry, PartitionKey, RecordCache,
};
pub use catalog::{PartitionCatalog, PartitionRange};
pub use clock::{Clock, ManualClock, SystemClock};
pub use compress::{compress, compress_all, decompress, decompress_all};
pub use loader::{load_partition, PartitionView};
pub use models::{CachedRecord, Creature};
pub use network::{
    ConnectionInfo, EffectiveConnectionType, NetworkConditionMonitor, NetworkInformation,
    StaticNetwork, UnknownNetwork,
};
pub use preload::{PreloadContext, PreloadOptions, PreloadPhase, PreloadScheduler, PreloadStatus};
pub use source::{DataSource, FetchOptions, FetchPolicy, PartitionPage, PreloadPriority};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
