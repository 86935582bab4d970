//! Contract for the remote data source.
//!
//! The cache and preloader consume a `DataSource`; they never know whether it
//! is an HTTP client, a fixture, or something with its own response cache.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cache::PartitionKey;
use crate::models::Creature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Answer from the source's own response cache when it can
    #[default]
    CacheFirst,
    NetworkOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadPriority {
    Low,
    #[default]
    Normal,
}

impl std::str::FromStr for PreloadPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(PreloadPriority::Low),
            "normal" => Ok(PreloadPriority::Normal),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FetchOptions {
    pub policy: FetchPolicy,
    pub priority: PreloadPriority,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PartitionPage {
    #[serde(default)]
    pub records: Vec<Creature>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Records of one partition; an empty page is a valid answer.
    async fn query_partition(
        &self,
        partition: PartitionKey,
        options: FetchOptions,
    ) -> Result<PartitionPage>;

    /// A single record, `None` when the id is unknown.
    async fn query_by_id(&self, id: u32, options: FetchOptions) -> Result<Option<Creature>>;
}
