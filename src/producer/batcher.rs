//! Batching Producer
//!
//! Turns an unbounded record stream into whole batches pushed to the append log.
//!
//! ## Guarantees
//! - A batch preserves arrival order and is flushed whole; the producer never splits it.
//! - The buffer is taken out in the same step that decides to flush, so no record is
//!   counted in two flushes and none falls between counting and flushing.
//! - Each instance owns its buffer. Parallel producers never share one.
//!
//! A failed bulk put is retried with backoff. Once the attempts run out the batch is
//! dropped, counted and logged, and ingestion carries on.

use crate::log::types::{PutAck, PutRecordEntry};
use crate::log::AppendLog;
use crate::source::types::Record;
use crate::stats::PipelineStats;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("bulk put failed after {attempts} attempts, dropped {dropped} records: {reason}")]
    PutFailed {
        attempts: usize,
        dropped: usize,
        reason: String,
    },
    #[error("failed to serialize record {id}: {reason}")]
    Serialize { id: u64, reason: String },
}

#[derive(Debug, Clone)]
pub struct ProducerOptions {
    pub batch_size: usize,
    pub default_partition_key: String,
    pub put_attempts: usize,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            default_partition_key: "unknown".to_string(),
            put_attempts: 3,
            retry_delay: Duration::from_millis(150),
            max_retry_delay: Duration::from_millis(1200),
        }
    }
}

pub struct BatchingProducer {
    log: Arc<dyn AppendLog>,
    options: ProducerOptions,
    buffer: Vec<Record>,
    /// Arrival time of the oldest buffered record, for the time-based flush.
    oldest: Option<Instant>,
    stats: Arc<PipelineStats>,
}

impl BatchingProducer {
    pub fn new(
        log: Arc<dyn AppendLog>,
        options: ProducerOptions,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let capacity = options.batch_size.max(1);
        Self {
            log,
            options,
            buffer: Vec::with_capacity(capacity),
            oldest: None,
            stats,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.options.batch_size.max(1)
    }

    /// Number of records buffered and not yet flushed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn oldest_pending_since(&self) -> Option<Instant> {
        self.oldest
    }

    /// Buffers one record and flushes when the buffer reaches the batch size.
    ///
    /// Returns the put ack when this call triggered a flush.
    pub async fn ingest(&mut self, record: Record) -> Result<Option<PutAck>, ProducerError> {
        if self.buffer.is_empty() {
            self.oldest = Some(Instant::now());
        }
        self.buffer.push(record);
        self.stats.records_ingested.inc();

        if self.buffer.len() >= self.batch_size() {
            return self.flush().await;
        }
        Ok(None)
    }

    /// Pushes the whole buffer as one bulk put. A no-op on an empty buffer.
    pub async fn flush(&mut self) -> Result<Option<PutAck>, ProducerError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let capacity = self.batch_size();
        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(capacity));
        self.oldest = None;

        let count = batch.len();
        let entries = self.build_entries(batch)?;
        let ack = self.put_with_retry(entries).await?;

        self.stats.batches_put.inc();
        self.stats.records_put.inc_by(count as u64);
        tracing::debug!("Flushed batch of {} records", count);

        Ok(Some(ack))
    }

    /// Discards the unflushed buffer after a source fault and reports how many were lost.
    pub fn discard_pending(&mut self) -> usize {
        let lost = self.buffer.len();
        self.buffer.clear();
        self.oldest = None;
        if lost > 0 {
            self.stats.records_lost.inc_by(lost as u64);
        }
        lost
    }

    pub fn partition_key_for(&self, record: &Record) -> String {
        partition_key(record, &self.options.default_partition_key)
    }

    fn build_entries(&self, batch: Vec<Record>) -> Result<Vec<PutRecordEntry>, ProducerError> {
        batch
            .into_iter()
            .map(|record| {
                let partition_key = self.partition_key_for(&record);
                let data = serde_json::to_vec(&record).map_err(|e| ProducerError::Serialize {
                    id: record.id,
                    reason: e.to_string(),
                })?;
                Ok(PutRecordEntry {
                    data,
                    partition_key,
                })
            })
            .collect()
    }

    async fn put_with_retry(&self, entries: Vec<PutRecordEntry>) -> Result<PutAck, ProducerError> {
        let attempts = self.options.put_attempts.max(1);
        let mut delay = self.options.retry_delay;
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.log.put_records(entries.clone()).await {
                Ok(ack) => return Ok(ack),
                Err(e) => {
                    self.stats.put_failures.inc();
                    tracing::warn!(
                        "Bulk put of {} records failed (attempt {}/{}): {}",
                        entries.len(),
                        attempt + 1,
                        attempts,
                        e
                    );
                    last_error = e.to_string();
                    if attempt + 1 == attempts {
                        break;
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(delay + Duration::from_millis(jitter)).await;
                    delay = (delay * 2).min(self.options.max_retry_delay);
                }
            }
        }

        let dropped = entries.len();
        self.stats.records_dropped.inc_by(dropped as u64);
        tracing::error!("Dropping batch of {} records: {}", dropped, last_error);

        Err(ProducerError::PutFailed {
            attempts,
            dropped,
            reason: last_error,
        })
    }
}

/// The record's location when it has one, the default key otherwise.
pub fn partition_key(record: &Record, default_key: &str) -> String {
    record
        .location
        .as_deref()
        .map(str::trim)
        .filter(|location| !location.is_empty())
        .unwrap_or(default_key)
        .to_string()
}
