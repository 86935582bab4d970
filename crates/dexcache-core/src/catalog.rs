//! Partition layout of the dataset.
//!
//! Partitions 1 through 9 are the generations, partition 0 holds the
//! alternate forms that live outside the national numbering. The popular-id
//! lists are hand-curated and are loaded as data, never derived.

use serde::{Deserialize, Serialize};

use crate::cache::PartitionKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionRange {
    pub partition: PartitionKey,
    pub min: u32,
    pub max: u32,
    /// Starters, version mascots and other frequently viewed ids
    #[serde(default)]
    pub popular: Vec<u32>,
}

impl PartitionRange {
    pub fn contains(&self, id: u32) -> bool {
        (self.min..=self.max).contains(&id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionCatalog {
    pub partitions: Vec<PartitionRange>,
}

impl Default for PartitionCatalog {
    fn default() -> Self {
        let range = |partition, min, max, popular: &[u32]| PartitionRange {
            partition,
            min,
            max,
            popular: popular.to_vec(),
        };
        Self {
            partitions: vec![
                range(0, 10001, 10277, &[10034, 10035, 10091, 10100, 10195]),
                range(1, 1, 151, &[1, 4, 7, 25, 133, 143, 149, 150, 151]),
                range(2, 152, 251, &[152, 155, 158, 196, 197, 248, 249, 250, 251]),
                range(3, 252, 386, &[252, 255, 258, 282, 373, 376, 382, 383, 384]),
                range(4, 387, 493, &[387, 390, 393, 445, 448, 483, 484, 487, 493]),
                range(5, 494, 649, &[494, 495, 498, 501, 635, 643, 644, 646]),
                range(6, 650, 721, &[650, 653, 656, 700, 706, 716, 717, 718]),
                range(7, 722, 809, &[722, 725, 728, 778, 791, 792, 800, 802]),
                range(8, 810, 905, &[810, 813, 816, 887, 888, 889, 890, 898]),
                range(9, 906, 1025, &[906, 909, 912, 998, 1007, 1008, 1024, 1025]),
            ],
        }
    }
}

impl PartitionCatalog {
    pub fn range(&self, partition: PartitionKey) -> Option<&PartitionRange> {
        self.partitions.iter().find(|r| r.partition == partition)
    }

    pub fn partition_of(&self, id: u32) -> Option<PartitionKey> {
        self.range_of(id).map(|r| r.partition)
    }

    pub fn range_of(&self, id: u32) -> Option<&PartitionRange> {
        self.partitions.iter().find(|r| r.contains(id))
    }

    pub fn contains(&self, id: u32) -> bool {
        self.range_of(id).is_some()
    }

    /// First id of each generation, in generation order
    pub fn generation_starts(&self) -> Vec<u32> {
        let mut generations: Vec<&PartitionRange> =
            self.partitions.iter().filter(|r| r.partition != 0).collect();
        generations.sort_by_key(|r| r.partition);
        generations.into_iter().map(|r| r.min).collect()
    }

    /// Check that ranges are well formed and do not overlap
    pub fn validate(&self) -> Result<(), String> {
        for (i, a) in self.partitions.iter().enumerate() {
            if a.min > a.max {
                return Err(format!("partition {} has min {} > max {}", a.partition, a.min, a.max));
            }
            for b in &self.partitions[i + 1..] {
                if a.partition == b.partition {
                    return Err(format!("partition {} listed twice", a.partition));
                }
                if a.min <= b.max && b.min <= a.max {
                    return Err(format!("partitions {} and {} overlap", a.partition, b.partition));
                }
            }
        }
        Ok(())
    }
}
