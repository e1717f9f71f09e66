//! In-Memory Append Log
//!
//! A sharded, ordered-within-shard log with a bounded retention window.
//!
//! ## Responsibilities
//! - **Placement**: Routing each entry to a shard by hashing its partition key.
//! - **Ordering**: Assigning strictly increasing sequence numbers per shard.
//! - **Retention**: Trimming entries older than the retention window on every access.
//! - **Checkpoints**: Tracking, per named subscriber and shard, the last committed sequence.
//!   Subscribers never mutate the entries themselves, so they stay independent of each
//!   other and of the producer.
//!
//! Not durable: entries and checkpoints exist only in this process and are gone on exit.

use super::partitioner::ShardPartitioner;
use super::types::*;
use super::AppendLog;

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;

pub struct MemoryLog {
    /// Structure: `Shard ID -> ordered entries`.
    shards: DashMap<u32, ShardLog>,
    /// Structure: `(subscriber, shard) -> last committed sequence`.
    checkpoints: DashMap<(String, u32), u64>,
    partitioner: ShardPartitioner,
    retention: Duration,
}

#[derive(Debug, Default)]
struct ShardLog {
    entries: VecDeque<LogEntry>,
    next_sequence: u64,
}

impl ShardLog {
    fn trim_before(&mut self, cutoff_ms: u64) -> usize {
        let mut trimmed = 0;
        while let Some(front) = self.entries.front() {
            if front.appended_at >= cutoff_ms {
                break;
            }
            self.entries.pop_front();
            trimmed += 1;
        }
        trimmed
    }
}

impl MemoryLog {
    pub fn new(num_shards: u32, retention: Duration) -> Self {
        let partitioner = ShardPartitioner::new(num_shards);
        let shards = DashMap::new();
        for shard in 0..partitioner.num_shards() {
            shards.insert(shard, ShardLog::default());
        }

        Self {
            shards,
            checkpoints: DashMap::new(),
            partitioner,
            retention,
        }
    }

    /// Removes every entry that has outlived the retention window as of `now_ms`.
    pub fn trim_expired(&self, now_ms: u64) -> usize {
        let cutoff = now_ms.saturating_sub(self.retention.as_millis() as u64);
        let mut trimmed = 0;
        for mut shard in self.shards.iter_mut() {
            trimmed += shard.value_mut().trim_before(cutoff);
        }
        if trimmed > 0 {
            tracing::debug!("Trimmed {} entries past retention", trimmed);
        }
        trimmed
    }

    pub fn retained_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.entries.len()).sum()
    }

    fn append(&self, entry: PutRecordEntry, now: u64) -> RecordAck {
        let shard = self.partitioner.get_shard(&entry.partition_key);
        let mut log = self.shards.entry(shard).or_default();

        log.next_sequence += 1;
        let sequence = log.next_sequence;
        log.entries.push_back(LogEntry {
            shard,
            sequence,
            partition_key: entry.partition_key,
            data: entry.data,
            appended_at: now,
        });

        RecordAck { shard, sequence }
    }
}

#[async_trait]
impl AppendLog for MemoryLog {
    async fn put_records(&self, entries: Vec<PutRecordEntry>) -> Result<PutAck, LogError> {
        let now = now_ms();
        self.trim_expired(now);

        let records: Vec<RecordAck> = entries
            .into_iter()
            .map(|entry| self.append(entry, now))
            .collect();

        tracing::trace!("Appended {} entries", records.len());
        Ok(PutAck { records })
    }

    fn shard_ids(&self) -> Vec<u32> {
        (0..self.partitioner.num_shards()).collect()
    }

    async fn read(
        &self,
        shard: u32,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<LogEntry>, LogError> {
        self.trim_expired(now_ms());

        let log = self.shards.get(&shard).ok_or(LogError::UnknownShard(shard))?;
        let after = after.unwrap_or(0);
        let start = log.entries.partition_point(|entry| entry.sequence <= after);

        Ok(log
            .entries
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn checkpoint(&self, subscriber: &str, shard: u32) -> Option<u64> {
        self.checkpoints
            .get(&(subscriber.to_string(), shard))
            .map(|seq| *seq)
    }

    async fn commit(&self, subscriber: &str, shard: u32, sequence: u64) -> Result<(), LogError> {
        if !self.shards.contains_key(&shard) {
            return Err(LogError::UnknownShard(shard));
        }

        // Never move a checkpoint backwards.
        let mut current = self
            .checkpoints
            .entry((subscriber.to_string(), shard))
            .or_insert(0);
        if sequence > *current {
            *current = sequence;
        }
        Ok(())
    }
}
