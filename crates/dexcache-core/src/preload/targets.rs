//! Choice of ids to fetch ahead of navigation.
//!
//! Four heuristics run in a fixed order and fill at most [`MAX_TARGETS`]
//! slots. Earlier heuristics always win ties; within one heuristic the
//! enumeration order is kept.

use std::collections::HashSet;

use crate::cache::{CachedIdIndex, PartitionKey};
use crate::catalog::{PartitionCatalog, PartitionRange};

pub const MAX_TARGETS: usize = 10;

/// Ids taken from the start of each generation
pub const PARTITION_START_SPAN: u32 = 9;

/// Raw candidates gathered from generation starts before trimming
pub const MAX_PARTITION_START_CANDIDATES: usize = 40;

/// What target selection needs to know about the cache.
pub trait CacheView {
    fn is_cached(&self, id: u32) -> bool;
    fn highest_known_id(&self, partition: PartitionKey) -> Option<u32>;
}

impl CacheView for CachedIdIndex {
    fn is_cached(&self, id: u32) -> bool {
        CachedIdIndex::is_cached(self, id)
    }

    fn highest_known_id(&self, partition: PartitionKey) -> Option<u32> {
        CachedIdIndex::highest_known_id(self, partition)
    }
}

struct Picker {
    chosen: Vec<u32>,
    seen: HashSet<u32>,
}

impl Picker {
    fn new() -> Self {
        Self {
            chosen: Vec::with_capacity(MAX_TARGETS),
            seen: HashSet::new(),
        }
    }

    fn is_full(&self) -> bool {
        self.chosen.len() >= MAX_TARGETS
    }

    fn has(&self, id: u32) -> bool {
        self.seen.contains(&id)
    }

    fn push(&mut self, id: u32, bounds: &PartitionRange) {
        if self.is_full() || !bounds.contains(id) || !self.seen.insert(id) {
            return;
        }
        self.chosen.push(id);
    }
}

/// Targets for a viewer currently looking at `current_id`.
///
/// Returns an empty list when `current_id` belongs to no partition.
pub fn select_targets(
    current_id: u32,
    catalog: &PartitionCatalog,
    cache: &impl CacheView,
) -> Vec<u32> {
    let Some(current) = catalog.range_of(current_id) else {
        return Vec::new();
    };
    let mut picker = Picker::new();

    // 1. Sequential neighbours, clamped to the partition end
    for offset in 1..=MAX_TARGETS as u32 {
        picker.push(current_id.saturating_add(offset).min(current.max), current);
    }
    // The viewed id itself is never worth a later slot
    picker.seen.insert(current_id);

    // 2. Just past the highest id already cached for this partition
    if let Some(highest) = cache.highest_known_id(current.partition) {
        for id in (highest.saturating_add(1)..=current.max).take(MAX_TARGETS) {
            picker.push(id, current);
        }
    }

    // 3. Heads of every generation not yet cached, kept only when they fall
    // inside the current partition
    let mut raw: Vec<u32> = Vec::new();
    'starts: for start in catalog.generation_starts() {
        for id in start..start.saturating_add(PARTITION_START_SPAN) {
            if raw.len() >= MAX_PARTITION_START_CANDIDATES {
                break 'starts;
            }
            if !cache.is_cached(id) && !picker.has(id) {
                raw.push(id);
            }
        }
    }
    for id in raw {
        picker.push(id, current);
    }

    // 4. Curated favourites of the current partition
    for &id in &current.popular {
        picker.push(id, current);
    }

    picker.chosen
}
