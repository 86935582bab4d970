//! HTTP client for the creature API.
//!
//! Single-record responses are written to a [`RecordCache`], so a record
//! fetched by the preloader is answered locally, by this process or a later
//! one, the next time it is asked for with `FetchPolicy::CacheFirst`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use dexcache_core::{
    compress, decompress, Creature, DataSource, FetchOptions, FetchPolicy, PartitionKey,
    PartitionPage, PreloadPriority, RecordCache,
};
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::SourceError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Extensible request priority header (RFC 9218)
const PRIORITY_HEADER: &str = "priority";

/// Priority header value for a fetch priority.
/// Urgency 3 is the protocol default; background work goes lower.
fn priority_value(priority: PreloadPriority) -> &'static str {
    match priority {
        PreloadPriority::Low => "u=5, i",
        PreloadPriority::Normal => "u=3",
    }
}

/// Data source backed by the creature REST API.
/// Clone is cheap - reqwest::Client and the record cache are shared.
#[derive(Clone)]
pub struct HttpDataSource {
    client: Client,
    base_url: String,
    records: Arc<RecordCache>,
}

impl HttpDataSource {
    pub fn new(base_url: &str, records: Arc<RecordCache>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            records,
        })
    }

    fn partition_url(&self, partition: PartitionKey) -> String {
        format!("{}/partitions/{}", self.base_url, partition)
    }

    fn creature_url(&self, id: u32) -> String {
        format!("{}/creatures/{}", self.base_url, id)
    }

    fn remembered(&self, id: u32) -> Option<Creature> {
        self.records.get(id).map(|record| decompress(&record))
    }

    fn remember(&self, creature: &Creature) {
        self.records.put(&compress(creature));
    }

    /// Check response status, returning None for rate limit (to trigger retry)
    /// or an error for other failures.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(SourceError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, priority: PreloadPriority) -> Result<T> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .header(header::ACCEPT, "application/json")
                .header(PRIORITY_HEADER, priority_value(priority))
                .send()
                .await
                .map_err(SourceError::from)
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(SourceError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<SourceError>()
        .is_some_and(SourceError::is_not_found)
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn query_partition(
        &self,
        partition: PartitionKey,
        options: FetchOptions,
    ) -> Result<PartitionPage> {
        let url = self.partition_url(partition);
        debug!(partition, "Fetching partition");
        self.get(&url, options.priority).await
    }

    async fn query_by_id(&self, id: u32, options: FetchOptions) -> Result<Option<Creature>> {
        if options.policy == FetchPolicy::CacheFirst {
            if let Some(creature) = self.remembered(id) {
                return Ok(Some(creature));
            }
        }

        match self.get::<Creature>(&self.creature_url(id), options.priority).await {
            Ok(creature) => {
                self.remember(&creature);
                Ok(Some(creature))
            }
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcache_core::{CacheConfig, FileStorage, MemoryStorage};
    use tempfile::TempDir;

    // Nothing listens on the discard port; any real request fails fast
    const UNREACHABLE: &str = "http://127.0.0.1:9/api/";

    fn source() -> HttpDataSource {
        let records = RecordCache::new(Arc::new(MemoryStorage::new()), CacheConfig::default());
        HttpDataSource::new(UNREACHABLE, Arc::new(records)).unwrap()
    }

    fn pikachu() -> Creature {
        Creature {
            id: 25,
            name: "pikachu".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_urls() {
        let source = source();
        assert_eq!(source.partition_url(3), "http://127.0.0.1:9/api/partitions/3");
        assert_eq!(source.creature_url(25), "http://127.0.0.1:9/api/creatures/25");
    }

    #[test]
    fn test_priority_header_values() {
        assert_eq!(priority_value(PreloadPriority::Normal), "u=3");
        assert_eq!(priority_value(PreloadPriority::Low), "u=5, i");
    }

    #[test]
    fn test_not_found_detection() {
        let err: anyhow::Error = SourceError::NotFound("gone".into()).into();
        assert!(is_not_found(&err));
        let err: anyhow::Error = SourceError::RateLimited.into();
        assert!(!is_not_found(&err));
    }

    #[tokio::test]
    async fn test_cache_first_answers_from_record_cache() {
        let source = source();
        source.remember(&pikachu());

        let found = source
            .query_by_id(25, FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(found.map(|c| c.name), Some("pikachu".to_string()));
    }

    #[tokio::test]
    async fn test_network_only_skips_record_cache() {
        let source = source();
        source.remember(&pikachu());

        let options = FetchOptions {
            policy: FetchPolicy::NetworkOnly,
            ..FetchOptions::default()
        };
        assert!(source.query_by_id(25, options).await.is_err());
    }

    #[tokio::test]
    async fn test_fetched_records_outlive_the_source() {
        let dir = TempDir::new().unwrap();
        let open = || {
            let storage = FileStorage::new(dir.path().to_path_buf(), 1 << 20).unwrap();
            let records = RecordCache::new(Arc::new(storage), CacheConfig::default());
            HttpDataSource::new(UNREACHABLE, Arc::new(records)).unwrap()
        };

        open().remember(&pikachu());

        // A fresh source over the same directory, with no reachable server
        let later = open();
        let found = later
            .query_by_id(25, FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(found.map(|c| c.name), Some("pikachu".to_string()));

        // Anything not on disk still needs the network
        assert!(later.query_by_id(26, FetchOptions::default()).await.is_err());
    }
}
