//! Background preloading of likely next records.
//!
//! A `PreloadScheduler` follows the record the user is viewing. Each time the
//! viewed id changes it cancels whatever it was doing, waits for the user to
//! settle, picks targets (see [`super::targets`]) and fetches them in small
//! concurrent batches with a pause between batches.
//!
//! ```text
//! Idle -> Scheduled -> Running -> Completed
//!             |           |
//!             +-----------+-----> Cancelled
//! ```
//!
//! Cancellation is cooperative. It is checked when the delay ends, before each
//! batch and before each fetch; a cancelled run never touches the status again.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::targets::select_targets;
use crate::cache::CacheStore;
use crate::catalog::PartitionCatalog;
use crate::network::NetworkConditionMonitor;
use crate::source::{DataSource, FetchOptions, FetchPolicy, PreloadPriority};

// ============================================================================
// Constants
// ============================================================================

/// Idle time before a run starts.
/// Rapid navigation restarts the timer, so only a settled view triggers fetches.
pub const DEFAULT_PRELOAD_DELAY: Duration = Duration::from_millis(3000);

/// Fetches in flight at once during a run.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

/// Pause between batches, leaves room for foreground requests.
pub const INTER_BATCH_PAUSE: Duration = Duration::from_millis(500);

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct PreloadOptions {
    pub current_id: u32,
    pub enabled: bool,
    pub delay: Duration,
    pub max_concurrent: usize,
    pub priority: PreloadPriority,
}

impl PreloadOptions {
    pub fn new(current_id: u32) -> Self {
        Self {
            current_id,
            enabled: true,
            delay: DEFAULT_PRELOAD_DELAY,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            priority: PreloadPriority::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreloadStatus {
    pub total: usize,
    pub completed: usize,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreloadPhase {
    #[default]
    Idle,
    Scheduled,
    Running,
    Completed,
    Cancelled,
}

impl PreloadPhase {
    /// Whether a run is armed or executing
    pub fn is_live(&self) -> bool {
        matches!(self, PreloadPhase::Scheduled | PreloadPhase::Running)
    }
}

/// Collaborators a scheduler works with. Cheap to clone.
#[derive(Clone)]
pub struct PreloadContext {
    pub source: Arc<dyn DataSource>,
    pub cache: Arc<CacheStore>,
    pub network: Arc<NetworkConditionMonitor>,
    pub catalog: Arc<PartitionCatalog>,
}

/// State observed by the owner and written by the current run.
struct Shared {
    status: watch::Sender<PreloadStatus>,
    phase: watch::Sender<PreloadPhase>,
    targets: Mutex<Vec<u32>>,
}

impl Shared {
    fn new() -> Self {
        let (status, _) = watch::channel(PreloadStatus::default());
        let (phase, _) = watch::channel(PreloadPhase::Idle);
        Self {
            status,
            phase,
            targets: Mutex::new(Vec::new()),
        }
    }

    /// Publish the targets and the fresh status of a run that passed its
    /// delay. Both land under the status lock, after the token check.
    fn begin_run(&self, token: &CancellationToken, targets: &[u32]) -> bool {
        self.update_status(token, |status| {
            *self.targets.lock().unwrap_or_else(|p| p.into_inner()) = targets.to_vec();
            *status = PreloadStatus {
                total: targets.len(),
                completed: 0,
                active: true,
            };
        })
    }

    /// Apply `f` unless the run owning `token` has been cancelled.
    /// The check happens under the channel lock, so nothing lands after
    /// `cancel` returns.
    fn update_status(&self, token: &CancellationToken, f: impl FnOnce(&mut PreloadStatus)) -> bool {
        self.status.send_if_modified(|status| {
            if token.is_cancelled() {
                return false;
            }
            f(status);
            true
        })
    }

    fn set_phase(&self, token: &CancellationToken, phase: PreloadPhase) -> bool {
        self.phase.send_if_modified(|current| {
            if token.is_cancelled() {
                return false;
            }
            *current = phase;
            true
        })
    }

    fn cancel(&self, token: &CancellationToken) {
        if token.is_cancelled() {
            return;
        }
        token.cancel();
        self.status.send_modify(|status| status.active = false);
        self.phase.send_if_modified(|phase| {
            if phase.is_live() {
                *phase = PreloadPhase::Cancelled;
                true
            } else {
                false
            }
        });
    }
}

struct RunHandle {
    token: CancellationToken,
    _task: JoinHandle<()>,
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct PreloadScheduler {
    ctx: PreloadContext,
    options: PreloadOptions,
    shared: Arc<Shared>,
    run: Option<RunHandle>,
}

impl PreloadScheduler {
    /// Create a scheduler and arm its first run. Must be called inside a
    /// Tokio runtime.
    pub fn new(ctx: PreloadContext, options: PreloadOptions) -> Self {
        let mut scheduler = Self {
            ctx,
            options,
            shared: Arc::new(Shared::new()),
            run: None,
        };
        scheduler.restart();
        scheduler
    }

    pub fn options(&self) -> &PreloadOptions {
        &self.options
    }

    pub fn set_current_id(&mut self, current_id: u32) {
        if self.options.current_id == current_id {
            return;
        }
        self.options.current_id = current_id;
        self.restart();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.options.enabled == enabled {
            return;
        }
        self.options.enabled = enabled;
        self.restart();
    }

    /// Stop the current run, if any. Completed fetches stay completed.
    pub fn cancel(&self) {
        if let Some(run) = &self.run {
            debug!(current_id = self.options.current_id, "Preload cancelled");
            self.shared.cancel(&run.token);
        }
    }

    pub fn status(&self) -> PreloadStatus {
        *self.shared.status.borrow()
    }

    pub fn is_preloading(&self) -> bool {
        self.status().active
    }

    pub fn phase(&self) -> PreloadPhase {
        *self.shared.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PreloadStatus> {
        self.shared.status.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<PreloadPhase> {
        self.shared.phase.subscribe()
    }

    /// Targets of the current run, empty until its delay has passed
    pub fn targets(&self) -> Vec<u32> {
        self.shared
            .targets
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn restart(&mut self) {
        if let Some(run) = self.run.take() {
            self.shared.cancel(&run.token);
        }

        if !self.options.enabled {
            debug!("Preloading disabled");
            return;
        }
        if !self.ctx.network.should_preload() {
            debug!("Slow network, not preloading");
            return;
        }

        let token = CancellationToken::new();
        self.shared.targets.lock().unwrap_or_else(|p| p.into_inner()).clear();
        self.shared.status.send_replace(PreloadStatus::default());
        self.shared.phase.send_replace(PreloadPhase::Scheduled);
        debug!(
            current_id = self.options.current_id,
            delay_ms = self.options.delay.as_millis() as u64,
            "Preload scheduled"
        );

        let task = tokio::spawn(run_preload(
            self.ctx.clone(),
            self.options.clone(),
            Arc::clone(&self.shared),
            token.clone(),
        ));
        self.run = Some(RunHandle { token, _task: task });
    }
}

impl Drop for PreloadScheduler {
    fn drop(&mut self) {
        if let Some(run) = self.run.take() {
            run.token.cancel();
        }
    }
}

// ============================================================================
// Run
// ============================================================================

async fn run_preload(
    ctx: PreloadContext,
    options: PreloadOptions,
    shared: Arc<Shared>,
    token: CancellationToken,
) {
    if !options.delay.is_zero() {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(options.delay) => {}
        }
    }
    if token.is_cancelled() {
        return;
    }

    let index = ctx.cache.cached_id_index();
    let targets = select_targets(options.current_id, &ctx.catalog, &index);
    let total = targets.len();

    if !shared.begin_run(&token, &targets) || !shared.set_phase(&token, PreloadPhase::Running) {
        return;
    }
    info!(current_id = options.current_id, total, "Preload started");

    let fetch_options = FetchOptions {
        policy: FetchPolicy::CacheFirst,
        priority: options.priority,
    };
    let batch_size = options.max_concurrent.max(1);
    let batch_count = total.div_ceil(batch_size);

    for (i, batch) in targets.chunks(batch_size).enumerate() {
        if token.is_cancelled() {
            return;
        }

        let fetches = batch
            .iter()
            .map(|&id| preload_one(&ctx, &shared, &token, id, fetch_options));
        join_all(fetches).await;

        if i + 1 < batch_count {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(INTER_BATCH_PAUSE) => {}
            }
        }
    }

    shared.update_status(&token, |status| status.active = false);
    if shared.set_phase(&token, PreloadPhase::Completed) {
        info!(
            current_id = options.current_id,
            completed = shared.status.borrow().completed,
            total,
            "Preload complete"
        );
    }
}

/// Fetch one target unless the cache already holds it. Failures are logged
/// and swallowed so sibling fetches carry on.
async fn preload_one(
    ctx: &PreloadContext,
    shared: &Shared,
    token: &CancellationToken,
    id: u32,
    options: FetchOptions,
) {
    if token.is_cancelled() {
        return;
    }

    let cached = ctx
        .catalog
        .partition_of(id)
        .map_or(false, |partition| ctx.cache.contains_id(partition, id));

    if !cached {
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = ctx.source.query_by_id(id, options) => result,
        };
        match result {
            Ok(Some(_)) => debug!(id, "Preloaded"),
            Ok(None) => debug!(id, "Preload target not found"),
            Err(e) => {
                debug!(id, error = %e, "Preload fetch failed");
                return;
            }
        }
    }

    shared.update_status(token, |status| status.completed += 1);
}

// ============================================================================
// Tests
// ============================================================================
