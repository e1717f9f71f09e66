//! Delivery Workers
//!
//! Drives handler invocations for one named subscription. Each shard gets its own worker,
//! so shards progress independently and concurrently while entries within a shard are
//! delivered in sequence order.
//!
//! ## Lifecycle of one batch
//! 1. **Read**: Fetch up to `max_batch` entries after the subscriber's checkpoint.
//! 2. **Invoke**: Run the handler under `invocation_timeout`.
//! 3. **Commit** on success, or **redeliver** the same entries after a backoff.
//! 4. **Abandon** after `max_attempts` failed invocations: the batch is logged, counted and
//!    committed past, so a poison batch cannot stall its shard forever.

use super::types::DeliveredBatch;
use super::types::DeliveredRecord;
use super::AppendLog;
use crate::stats::PipelineStats;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, batch: DeliveredBatch) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct SubscriptionOptions {
    pub max_batch: usize,
    pub poll_interval: Duration,
    pub invocation_timeout: Duration,
    pub max_attempts: u32,
    /// First redelivery delay; doubles per attempt up to `max_backoff`.
    pub retry_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            max_batch: 10,
            poll_interval: Duration::from_millis(100),
            invocation_timeout: Duration::from_secs(60),
            max_attempts: 10,
            retry_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Handle to a running subscription. Dropping it leaves the workers running.
pub struct Subscription {
    name: String,
    workers: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stops all workers. Uncommitted batches are redelivered on the next subscription.
    pub fn shutdown(self) {
        for worker in &self.workers {
            worker.abort();
        }
        tracing::info!("Subscription '{}' stopped", self.name);
    }
}

/// Starts one delivery worker per shard and returns immediately.
pub fn subscribe(
    log: Arc<dyn AppendLog>,
    name: &str,
    handler: Arc<dyn BatchHandler>,
    options: SubscriptionOptions,
    stats: Arc<PipelineStats>,
) -> Subscription {
    let shards = log.shard_ids();
    tracing::info!(
        "Starting subscription '{}' with {} shard workers",
        name,
        shards.len()
    );

    let workers = shards
        .into_iter()
        .map(|shard| {
            let worker = ShardWorker {
                log: log.clone(),
                subscriber: name.to_string(),
                shard,
                handler: handler.clone(),
                options: options.clone(),
                stats: stats.clone(),
            };
            tokio::spawn(async move { worker.run().await })
        })
        .collect();

    Subscription {
        name: name.to_string(),
        workers,
    }
}

struct ShardWorker {
    log: Arc<dyn AppendLog>,
    subscriber: String,
    shard: u32,
    handler: Arc<dyn BatchHandler>,
    options: SubscriptionOptions,
    stats: Arc<PipelineStats>,
}

impl ShardWorker {
    async fn run(&self) {
        tracing::debug!("Worker for '{}' shard {} started", self.subscriber, self.shard);

        loop {
            let after = self.log.checkpoint(&self.subscriber, self.shard).await;

            let entries = match self
                .log
                .read(self.shard, after, self.options.max_batch)
                .await
            {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Failed to read shard {}: {}", self.shard, e);
                    tokio::time::sleep(self.options.poll_interval).await;
                    continue;
                }
            };

            let Some(last_sequence) = entries.last().map(|entry| entry.sequence) else {
                // Sleep if no work to avoid busy-waiting
                tokio::time::sleep(self.options.poll_interval).await;
                continue;
            };

            let records: Vec<DeliveredRecord> =
                entries.into_iter().map(DeliveredRecord::from).collect();

            self.deliver(records, last_sequence).await;
        }
    }

    /// Invokes the handler until it succeeds or the attempt budget runs out, then commits.
    async fn deliver(&self, records: Vec<DeliveredRecord>, last_sequence: u64) {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let batch = DeliveredBatch {
                subscriber: self.subscriber.clone(),
                shard: self.shard,
                attempt,
                records: records.clone(),
            };

            let outcome =
                tokio::time::timeout(self.options.invocation_timeout, self.handler.handle(batch))
                    .await;

            match outcome {
                Ok(Ok(())) => {
                    self.stats.batches_delivered.inc();
                    tracing::debug!(
                        "Shard {} delivered {} records up to sequence {} (attempt {})",
                        self.shard,
                        records.len(),
                        last_sequence,
                        attempt
                    );
                    break;
                }
                Ok(Err(e)) => {
                    self.stats.delivery_failures.inc();
                    tracing::warn!(
                        "Shard {} batch ending at {} failed on attempt {}: {:#}",
                        self.shard,
                        last_sequence,
                        attempt,
                        e
                    );
                }
                Err(_) => {
                    self.stats.delivery_failures.inc();
                    tracing::warn!(
                        "Shard {} batch ending at {} timed out after {:?} on attempt {}",
                        self.shard,
                        last_sequence,
                        self.options.invocation_timeout,
                        attempt
                    );
                }
            }

            if attempt >= self.options.max_attempts {
                self.stats.batches_abandoned.inc();
                tracing::error!(
                    "Abandoning shard {} batch of {} records ending at {} after {} attempts",
                    self.shard,
                    records.len(),
                    last_sequence,
                    attempt
                );
                break;
            }

            tokio::time::sleep(self.backoff(attempt)).await;
        }

        if let Err(e) = self
            .log
            .commit(&self.subscriber, self.shard, last_sequence)
            .await
        {
            tracing::error!(
                "Failed to commit shard {} checkpoint {}: {}",
                self.shard,
                last_sequence,
                e
            );
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        let base = self
            .options
            .retry_backoff
            .saturating_mul(factor)
            .min(self.options.max_backoff);
        // Simple jitter to prevent thundering herd
        let jitter = rand::random::<u64>() % 50;
        base + Duration::from_millis(jitter)
    }
}
