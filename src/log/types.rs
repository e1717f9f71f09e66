//! Append Log Data Types

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One element of a bulk put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecordEntry {
    pub data: Vec<u8>,
    pub partition_key: String,
}

/// Placement of one accepted entry, index-aligned with the put request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordAck {
    pub shard: u32,
    pub sequence: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PutAck {
    pub records: Vec<RecordAck>,
}

/// An entry as retained by the log.
///
/// Sequence numbers are strictly increasing within a shard and start at 1, so a missing
/// checkpoint reads from the beginning of the retained window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub shard: u32,
    pub sequence: u64,
    pub partition_key: String,
    pub data: Vec<u8>,
    /// Milliseconds since the Unix epoch.
    pub appended_at: u64,
}

/// The consumer-facing form of an entry: the payload travels base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredRecord {
    pub sequence: u64,
    pub partition_key: String,
    pub data: String,
    pub approximate_arrival_ms: u64,
}

impl From<LogEntry> for DeliveredRecord {
    fn from(entry: LogEntry) -> Self {
        Self {
            sequence: entry.sequence,
            partition_key: entry.partition_key,
            data: base64::engine::general_purpose::STANDARD.encode(&entry.data),
            approximate_arrival_ms: entry.appended_at,
        }
    }
}

/// What one handler invocation receives.
///
/// The size is whatever the log hands out; it need not match the producer's batch size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredBatch {
    pub subscriber: String,
    pub shard: u32,
    /// 1 on first delivery, incremented on every redelivery of the same entries.
    pub attempt: u32,
    pub records: Vec<DeliveredRecord>,
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("shard {0} does not exist")]
    UnknownShard(u32),
    #[error("log unavailable: {0}")]
    Unavailable(String),
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
