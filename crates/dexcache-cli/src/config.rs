//! Application configuration management.
//!
//! Configuration is stored at `~/.config/dexcache/config.json`. Every field
//! has a default, so a missing file or a partial file is fine.
//!
//! `DEXCACHE_API_URL` (environment or `.env`) overrides `api_base_url`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dexcache_core::cache::{CACHE_SCHEMA_VERSION, CACHE_TTL_HOURS, MAX_CACHED_PARTITIONS};
use dexcache_core::preload::{DEFAULT_MAX_CONCURRENT, DEFAULT_PRELOAD_DELAY};
use dexcache_core::{
    CacheConfig, ConnectionInfo, EffectiveConnectionType, PartitionCatalog, PreloadOptions,
    PreloadPriority,
};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "dexcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the data source URL
pub const API_URL_ENV: &str = "DEXCACHE_API_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// Byte budget for the on-disk cache.
/// Matches the few megabytes a browser grants a single origin.
const DEFAULT_STORAGE_QUOTA_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub cache: CacheSettings,
    pub preload: PreloadSettings,
    pub network: NetworkSettings,
    /// JSON file replacing the built-in partition catalog
    pub catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub schema_version: String,
    pub ttl_hours: i64,
    pub max_partitions: usize,
    pub storage_quota_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadSettings {
    pub enabled: bool,
    pub delay_ms: u64,
    pub max_concurrent: usize,
    pub priority: PreloadPriority,
}

/// Fixed connection quality, for platforms that cannot report it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub effective_type: Option<EffectiveConnectionType>,
    pub save_data: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            cache: CacheSettings::default(),
            preload: PreloadSettings::default(),
            network: NetworkSettings::default(),
            catalog_path: None,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION.to_string(),
            ttl_hours: CACHE_TTL_HOURS,
            max_partitions: MAX_CACHED_PARTITIONS,
            storage_quota_bytes: DEFAULT_STORAGE_QUOTA_BYTES,
        }
    }
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: DEFAULT_PRELOAD_DELAY.as_millis() as u64,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            priority: PreloadPriority::Normal,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            schema_version: self.cache.schema_version.clone(),
            ttl: chrono_hours(self.cache.ttl_hours),
            max_partitions: self.cache.max_partitions.max(1),
            ..CacheConfig::default()
        }
    }

    pub fn preload_options(&self, current_id: u32) -> PreloadOptions {
        PreloadOptions {
            current_id,
            enabled: self.preload.enabled,
            delay: Duration::from_millis(self.preload.delay_ms),
            max_concurrent: self.preload.max_concurrent,
            priority: self.preload.priority,
        }
    }

    /// `None` when nothing is configured and the link should be assumed fast
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        if self.network.effective_type.is_none() && !self.network.save_data {
            return None;
        }
        Some(ConnectionInfo {
            effective_type: self.network.effective_type,
            save_data: self.network.save_data,
        })
    }

    pub fn catalog(&self) -> Result<PartitionCatalog> {
        let Some(path) = &self.catalog_path else {
            return Ok(PartitionCatalog::default());
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        let catalog: PartitionCatalog = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid catalog {}", path.display()))?;
        catalog
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid catalog {}: {}", path.display(), e))?;
        Ok(catalog)
    }
}

fn chrono_hours(hours: i64) -> chrono::Duration {
    chrono::Duration::hours(hours.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_core_constants() {
        let config = Config::default();
        let cache = config.cache_config();
        assert_eq!(cache.schema_version, CACHE_SCHEMA_VERSION);
        assert_eq!(cache.ttl, chrono::Duration::hours(24));
        assert_eq!(cache.max_partitions, 5);

        let options = config.preload_options(10);
        assert_eq!(options.delay, Duration::from_millis(3000));
        assert_eq!(options.max_concurrent, 2);
        assert_eq!(options.priority, PreloadPriority::Normal);
        assert!(options.enabled);
        assert!(config.connection_info().is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{ "preload": { "priority": "low" }, "network": { "effective_type": "2g" } }"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.preload.priority, PreloadPriority::Low);
        assert_eq!(config.preload.max_concurrent, 2);
        assert_eq!(
            config.connection_info(),
            Some(ConnectionInfo {
                effective_type: Some(EffectiveConnectionType::TwoG),
                save_data: false,
            })
        );
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.cache.max_partitions = 3;
        config.preload.enabled = false;

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_catalog_override_is_validated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{ "partitions": [
                { "partition": 1, "min": 1, "max": 151 },
                { "partition": 2, "min": 100, "max": 251 }
            ] }"#,
        )
        .unwrap();

        let config = Config {
            catalog_path: Some(path),
            ..Config::default()
        };
        assert!(config.catalog().is_err());
        assert_eq!(Config::default().catalog().unwrap(), PartitionCatalog::default());
    }

    #[test]
    fn test_negative_ttl_clamped() {
        let mut config = Config::default();
        config.cache.ttl_hours = -5;
        assert_eq!(config.cache_config().ttl, chrono::Duration::zero());
    }
}
