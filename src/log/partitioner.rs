use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Maps partition keys onto shards.
///
/// Equal keys always land on the same shard, which is what gives per-key ordering.
#[derive(Debug, Clone)]
pub struct ShardPartitioner {
    num_shards: u32,
}

impl ShardPartitioner {
    pub fn new(num_shards: u32) -> Self {
        Self {
            num_shards: num_shards.max(1),
        }
    }

    pub fn num_shards(&self) -> u32 {
        self.num_shards
    }

    pub fn get_shard(&self, partition_key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        partition_key.hash(&mut hasher);
        let hash = hasher.finish() as u32;
        hash % self.num_shards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_deterministic() {
        let partitioner = ShardPartitioner::new(8);

        let s1 = partitioner.get_shard("Madrid");
        let s2 = partitioner.get_shard("Madrid");
        assert_eq!(s1, s2);

        assert!(s1 < 8);
    }

    #[test]
    fn test_zero_shards_clamped() {
        let partitioner = ShardPartitioner::new(0);
        assert_eq!(partitioner.num_shards(), 1);
        assert_eq!(partitioner.get_shard("anything"), 0);
    }
}
