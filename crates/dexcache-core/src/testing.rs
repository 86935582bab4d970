//! In-process `DataSource` for unit tests.

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::time::Instant;

use crate::cache::PartitionKey;
use crate::catalog::PartitionCatalog;
use crate::models::{Creature, Sprites, TypeSlot};
use crate::source::{DataSource, FetchOptions, PartitionPage};

pub fn creature(id: u32) -> Creature {
    Creature {
        id,
        name: format!("creature-{}", id),
        types: vec![TypeSlot {
            slot: 1,
            type_name: "normal".to_string(),
        }],
        sprites: Sprites {
            front_default: Some(format!("https://img.example/{}.png", id)),
            official_artwork: None,
        },
        ..Default::default()
    }
}

pub struct FakeSource {
    catalog: PartitionCatalog,
    known: RangeInclusive<u32>,
    latency: Mutex<Duration>,
    failing_ids: Mutex<HashSet<u32>>,
    fail_partitions: AtomicBool,
    partition_calls: AtomicUsize,
    id_calls: Mutex<Vec<(u32, Instant, FetchOptions)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeSource {
    pub fn with_range(known: RangeInclusive<u32>) -> Self {
        Self {
            catalog: PartitionCatalog::default(),
            known,
            latency: Mutex::new(Duration::ZERO),
            failing_ids: Mutex::new(HashSet::new()),
            fail_partitions: AtomicBool::new(false),
            partition_calls: AtomicUsize::new(0),
            id_calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn fail_id(&self, id: u32) {
        self.failing_ids.lock().unwrap().insert(id);
    }

    pub fn fail_partitions(&self, fail: bool) {
        self.fail_partitions.store(fail, Ordering::SeqCst);
    }

    pub fn partition_calls(&self) -> usize {
        self.partition_calls.load(Ordering::SeqCst)
    }

    /// Ids requested through `query_by_id`, in call order
    pub fn requested_ids(&self) -> Vec<u32> {
        self.id_calls.lock().unwrap().iter().map(|(id, _, _)| *id).collect()
    }

    pub fn requested_options(&self) -> Vec<FetchOptions> {
        self.id_calls.lock().unwrap().iter().map(|(_, _, o)| *o).collect()
    }

    /// Number of distinct instants at which fetches were dispatched
    pub fn dispatch_waves(&self) -> usize {
        let calls = self.id_calls.lock().unwrap();
        let mut starts: Vec<Instant> = calls.iter().map(|(_, at, _)| *at).collect();
        starts.dedup();
        starts.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn query_partition(
        &self,
        partition: PartitionKey,
        _options: FetchOptions,
    ) -> Result<PartitionPage> {
        self.partition_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_partitions.load(Ordering::SeqCst) {
            return Err(anyhow!("source unavailable"));
        }
        let range = self
            .catalog
            .range(partition)
            .ok_or_else(|| anyhow!("no partition {}", partition))?;
        let records = (range.min..=range.max)
            .filter(|id| self.known.contains(id))
            .map(creature)
            .collect();
        Ok(PartitionPage {
            records,
            has_more: false,
            cursor: None,
        })
    }

    async fn query_by_id(&self, id: u32, options: FetchOptions) -> Result<Option<Creature>> {
        self.id_calls.lock().unwrap().push((id, Instant::now(), options));
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_ids.lock().unwrap().contains(&id) {
            return Err(anyhow!("fetch of {} failed", id));
        }
        Ok(self.known.contains(&id).then(|| creature(id)))
    }
}
