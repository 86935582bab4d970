//! Predictive preloading.
//!
//! This module decides which records a viewer is likely to open next and
//! fetches them in the background while the user lingers on a record.
//!
//! - `select_targets`: pure ranking over the catalog and the cache contents
//! - `PreloadScheduler`: delayed, batched, cancellable fetch runs

pub mod scheduler;
pub mod targets;

pub use scheduler::{
    PreloadContext, PreloadOptions, PreloadPhase, PreloadScheduler, PreloadStatus,
    DEFAULT_MAX_CONCURRENT, DEFAULT_PRELOAD_DELAY, INTER_BATCH_PAUSE,
};
pub use targets::{select_targets, CacheView, MAX_TARGETS};
