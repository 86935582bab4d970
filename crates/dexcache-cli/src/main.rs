//! dexcache - browse creature generations with an offline-first cache.
//!
//! Partitions are read through a size-bounded local cache, and `preload`
//! fetches the records a viewer is likely to open next.

mod api;
mod config;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dexcache_core::{
    decompress, load_partition, CacheStore, DataSource, EffectiveConnectionType, FetchOptions,
    FileStorage, KeyValueStorage, MemoryStorage, NetworkConditionMonitor, PartitionCatalog,
    PartitionKey, PreloadContext, PreloadPhase, PreloadPriority, PreloadScheduler, RecordCache,
    StaticNetwork,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use api::HttpDataSource;
use config::Config;

#[derive(Debug, Parser)]
#[command(name = "dexcache", version, about)]
struct Cli {
    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Keep the cache in memory for this run only
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the records of a partition (0 = forms, 1-9 = generations)
    View {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=9))]
        partition: PartitionKey,
    },
    /// Preload the records likely to be opened after ID
    Preload {
        id: u32,
        /// Wait before starting, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
        #[arg(long)]
        max_concurrent: Option<usize>,
        #[arg(long)]
        priority: Option<PreloadPriority>,
        /// Pretend the link reports this effective type (slow-2g, 2g, 3g, 4g)
        #[arg(long)]
        connection: Option<EffectiveConnectionType>,
        /// Pretend the user asked to save data
        #[arg(long)]
        save_data: bool,
    },
    /// Print one record, from the cache when it holds it
    Show { id: u32 },
    /// Show what the cache currently holds
    Stats,
    /// Drop one partition from the cache
    Invalidate {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=9))]
        partition: PartitionKey,
    },
    /// Drop every cached partition and record
    Clear,
    /// Write the effective configuration to disk
    InitConfig,
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

// ============================================================================
// Composition root
// ============================================================================

/// Subdirectory of the cache dir holding one file per fetched record
const RECORDS_DIR: &str = "records";

struct Services {
    config: Config,
    cache: Arc<CacheStore>,
    records: Arc<RecordCache>,
    source: Arc<HttpDataSource>,
    catalog: Arc<PartitionCatalog>,
}

impl Services {
    fn build(config: Config, ephemeral: bool) -> Result<Self> {
        let (storage, record_storage) = if ephemeral {
            let quota = config.cache.storage_quota_bytes;
            let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::with_quota(quota));
            let records: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::with_quota(quota));
            (storage, records)
        } else {
            let dir = config.cache_dir()?;
            (open_storage(&config, dir.clone())?, open_storage(&config, dir.join(RECORDS_DIR))?)
        };

        let cache = Arc::new(CacheStore::new(storage, config.cache_config()));
        let records = Arc::new(RecordCache::new(record_storage, config.cache_config()));
        let source = Arc::new(HttpDataSource::new(&config.api_base_url, records.clone())?);
        let catalog = Arc::new(config.catalog()?);

        Ok(Self {
            config,
            cache,
            records,
            source,
            catalog,
        })
    }

    fn network(&self) -> NetworkConditionMonitor {
        match self.config.connection_info() {
            Some(info) => NetworkConditionMonitor::new(Arc::new(StaticNetwork::new(info))),
            None => NetworkConditionMonitor::unknown(),
        }
    }
}

fn open_storage(config: &Config, dir: PathBuf) -> Result<Arc<dyn KeyValueStorage>> {
    let storage = FileStorage::new(dir.clone(), config.cache.storage_quota_bytes)
        .with_context(|| format!("Failed to open cache at {}", dir.display()))?;
    Ok(Arc::new(storage))
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env();
            Ok(config)
        }
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();
    let cli = Cli::parse();
    info!("dexcache starting");

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::InitConfig => {
            match &cli.config {
                Some(path) => config.save_to(path)?,
                None => config.save()?,
            }
            println!("Configuration written");
            Ok(())
        }
        Command::View { partition } => {
            let services = Services::build(config, cli.ephemeral)?;
            run_view(&services, partition).await
        }
        Command::Preload {
            id,
            delay_ms,
            max_concurrent,
            priority,
            connection,
            save_data,
        } => {
            let mut config = config;
            if let Some(delay_ms) = delay_ms {
                config.preload.delay_ms = delay_ms;
            }
            if let Some(max_concurrent) = max_concurrent {
                config.preload.max_concurrent = max_concurrent;
            }
            if let Some(priority) = priority {
                config.preload.priority = priority;
            }
            if connection.is_some() {
                config.network.effective_type = connection;
            }
            config.network.save_data |= save_data;

            let services = Services::build(config, cli.ephemeral)?;
            run_preload(&services, id).await
        }
        Command::Show { id } => {
            let services = Services::build(config, cli.ephemeral)?;
            run_show(&services, id).await
        }
        Command::Stats => {
            let services = Services::build(config, cli.ephemeral)?;
            print_stats(&services.cache);
            Ok(())
        }
        Command::Invalidate { partition } => {
            let services = Services::build(config, cli.ephemeral)?;
            services.cache.invalidate(partition);
            println!("Partition {} removed from cache", partition);
            Ok(())
        }
        Command::Clear => {
            let services = Services::build(config, cli.ephemeral)?;
            services.cache.clear();
            if !cli.ephemeral {
                clear_records(&services.config.cache_dir()?.join(RECORDS_DIR))?;
            }
            println!("Cache cleared");
            Ok(())
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_view(services: &Services, partition: PartitionKey) -> Result<()> {
    let view = load_partition(&services.cache, services.source.as_ref(), partition).await?;

    let origin = match &view.cache_age {
        Some(age) => format!("cached {}", age),
        None => "fetched".to_string(),
    };
    println!("Partition {} - {} records ({})", view.partition, view.records.len(), origin);
    for creature in &view.records {
        println!(
            "{:>6}  {:<24} {}",
            creature.id,
            creature.display_name("en"),
            creature.type_names().join("/")
        );
    }
    if view.has_more {
        println!("... more records available");
    }
    Ok(())
}

async fn run_preload(services: &Services, id: u32) -> Result<()> {
    if !services.catalog.contains(id) {
        anyhow::bail!("Id {} is outside every partition", id);
    }

    let ctx = PreloadContext {
        source: services.source.clone(),
        cache: services.cache.clone(),
        network: Arc::new(services.network()),
        catalog: services.catalog.clone(),
    };
    let scheduler = PreloadScheduler::new(ctx, services.config.preload_options(id));

    if scheduler.phase() == PreloadPhase::Idle {
        println!("Preloading skipped (disabled or slow network)");
        return Ok(());
    }

    let mut status_rx = scheduler.subscribe();
    let mut phase_rx = scheduler.subscribe_phase();
    loop {
        tokio::select! {
            done = phase_rx.wait_for(|phase| !phase.is_live()) => {
                done.context("Preload stopped unexpectedly")?;
                break;
            }
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                if status.active {
                    eprintln!("Preloading {}/{}", status.completed, status.total);
                }
            }
        }
    }

    let status = scheduler.status();
    println!(
        "Preloaded {} of {} records after #{}: {:?}",
        status.completed,
        status.total,
        id,
        scheduler.targets()
    );
    Ok(())
}

async fn run_show(services: &Services, id: u32) -> Result<()> {
    let partition = services
        .catalog
        .partition_of(id)
        .with_context(|| format!("Id {} is outside every partition", id))?;

    let (creature, origin) = match services.cache.find_record(partition, id) {
        Some(record) => (Some(decompress(&record)), "partition cache"),
        None => {
            let origin = if services.records.get(id).is_some() {
                "record cache"
            } else {
                "network"
            };
            let creature = services.source.query_by_id(id, FetchOptions::default()).await?;
            (creature, origin)
        }
    };

    let Some(creature) = creature else {
        println!("#{} not found", id);
        return Ok(());
    };
    println!("#{} {} ({})", creature.id, creature.display_name("en"), origin);
    println!("  Types: {}", creature.type_names().join("/"));
    let sprites = &creature.sprites;
    if let Some(sprite) = sprites.front_default.as_ref().or(sprites.official_artwork.as_ref()) {
        println!("  Sprite: {}", sprite);
    }
    Ok(())
}

/// Remove the record files. A missing directory is already clear.
fn clear_records(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to clear {}", dir.display())),
    }
}

fn print_stats(cache: &CacheStore) {
    let stats = cache.stats();
    if stats.cached_partitions.is_empty() {
        println!("Cache is empty");
        return;
    }

    let partitions: Vec<String> = stats
        .cached_partitions
        .iter()
        .map(|p| p.to_string())
        .collect();
    println!("Partitions: {}", partitions.join(", "));
    println!("Size: {} bytes", stats.total_size_bytes);
    if let Some(oldest) = stats.oldest {
        println!("Oldest: {}", oldest.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(newest) = stats.newest {
        println!("Newest: {}", newest.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_partition_argument_range() {
        assert!(Cli::try_parse_from(["dexcache", "view", "9"]).is_ok());
        assert!(Cli::try_parse_from(["dexcache", "view", "10"]).is_err());
    }

    #[test]
    fn test_preload_flags() {
        let cli = Cli::try_parse_from([
            "dexcache",
            "--ephemeral",
            "preload",
            "25",
            "--priority",
            "low",
            "--connection",
            "3g",
        ])
        .unwrap();
        assert!(cli.ephemeral);
        match cli.command {
            Command::Preload { id, priority, connection, .. } => {
                assert_eq!(id, 25);
                assert_eq!(priority, Some(PreloadPriority::Low));
                assert_eq!(connection, Some(EffectiveConnectionType::ThreeG));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_show_takes_an_id() {
        let cli = Cli::try_parse_from(["dexcache", "show", "10091"]).unwrap();
        assert!(matches!(cli.command, Command::Show { id: 10091 }));
        assert!(Cli::try_parse_from(["dexcache", "show"]).is_err());
    }

    #[test]
    fn test_clear_records_removes_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let records = dir.path().join(RECORDS_DIR);
        std::fs::create_dir_all(&records).unwrap();
        std::fs::write(records.join("dexcache_record_25.blob"), "x").unwrap();

        clear_records(&records).unwrap();
        assert!(!records.exists());
        // Already gone is fine
        clear_records(&records).unwrap();
    }

    #[tokio::test]
    async fn test_show_reads_partition_cache_without_network() {
        let mut config = Config::default();
        config.api_base_url = "http://127.0.0.1:9/api/".to_string();
        let services = Services::build(config, true).unwrap();
        let pikachu = dexcache_core::CachedRecord {
            id: 25,
            name: "pikachu".to_string(),
            types: vec!["electric".to_string()],
            sprite: None,
            names: None,
            genera: None,
            classification: None,
            form: None,
        };
        services.cache.put(1, vec![pikachu], false, None, 1);

        run_show(&services, 25).await.unwrap();
        assert!(run_show(&services, 26).await.is_err());
        assert!(run_show(&services, 99_999).await.is_err());
    }

    #[test]
    fn test_ephemeral_services_start_empty() {
        let services = Services::build(Config::default(), true).unwrap();
        assert!(services.cache.stats().cached_partitions.is_empty());
        assert!(services.records.get(25).is_none());
        assert!(!services.network().is_slow());
    }
}
