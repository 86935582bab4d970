//! Cache-first partition reads for list views.

use anyhow::{Context, Result};
use tracing::debug;

use crate::cache::{CacheStore, PartitionKey};
use crate::compress::{compress_all, decompress_all};
use crate::models::Creature;
use crate::source::{DataSource, FetchOptions, FetchPolicy};

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionView {
    pub partition: PartitionKey,
    pub records: Vec<Creature>,
    pub has_more: bool,
    pub cursor: Option<String>,
    pub from_cache: bool,
    /// How old the cached copy is, e.g. "12m ago"
    pub cache_age: Option<String>,
}

/// Serve a partition from the cache, falling back to the source and writing
/// the result through. Only source errors reach the caller.
pub async fn load_partition(
    cache: &CacheStore,
    source: &dyn DataSource,
    partition: PartitionKey,
) -> Result<PartitionView> {
    if let Some(entry) = cache.get(partition) {
        debug!(partition, count = entry.records.len(), "Partition served from cache");
        return Ok(PartitionView {
            partition,
            records: decompress_all(&entry.records),
            has_more: entry.has_more,
            cache_age: Some(entry.age_display(cache.now())),
            cursor: entry.cursor,
            from_cache: true,
        });
    }

    let options = FetchOptions {
        policy: FetchPolicy::CacheFirst,
        ..FetchOptions::default()
    };
    let page = source
        .query_partition(partition, options)
        .await
        .with_context(|| format!("Failed to fetch partition {}", partition))?;

    debug!(partition, count = page.records.len(), has_more = page.has_more, "Partition fetched");
    cache.put(
        partition,
        compress_all(&page.records),
        page.has_more,
        page.cursor.clone(),
        page.records.len(),
    );

    Ok(PartitionView {
        partition,
        records: page.records,
        has_more: page.has_more,
        cursor: page.cursor,
        from_cache: false,
        cache_age: None,
    })
}
