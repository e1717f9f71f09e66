//! Append Log Module
//!
//! The hand-off between the producer and the consumers: ordered within a shard,
//! retained for a bounded window, and readable by any number of independent subscribers.
//!
//! ## Delivery Model
//! 1. **Put**: The producer issues one bulk put per batch. Each entry carries a partition key
//!    that picks its shard.
//! 2. **Subscribe**: Each subscription runs one delivery worker per shard. A worker reads
//!    entries after its checkpoint and hands them to the handler as one `DeliveredBatch`.
//! 3. **Commit**: The checkpoint only advances after the handler succeeds. Failures and
//!    timeouts redeliver the same entries (at-least-once).
//!
//! There is no ordering guarantee across shards.
//!
//! ## Submodules
//! - **`memory`**: In-process implementation with retention and checkpoints.
//! - **`partitioner`**: Partition key -> shard mapping.
//! - **`subscriber`**: Delivery workers with timeout, redelivery and abandonment.
//! - **`types`**: Entries, acks, delivered batches and errors.

pub mod memory;
pub mod partitioner;
pub mod subscriber;
pub mod types;

use async_trait::async_trait;
use types::{LogEntry, LogError, PutAck, PutRecordEntry};

#[async_trait]
pub trait AppendLog: Send + Sync {
    /// Appends all entries in one call; the ack is index-aligned with `entries`.
    async fn put_records(&self, entries: Vec<PutRecordEntry>) -> Result<PutAck, LogError>;

    fn shard_ids(&self) -> Vec<u32>;

    /// Up to `limit` retained entries of `shard` with a sequence greater than `after`.
    async fn read(
        &self,
        shard: u32,
        after: Option<u64>,
        limit: usize,
    ) -> Result<Vec<LogEntry>, LogError>;

    async fn checkpoint(&self, subscriber: &str, shard: u32) -> Option<u64>;

    async fn commit(&self, subscriber: &str, shard: u32, sequence: u64) -> Result<(), LogError>;
}
