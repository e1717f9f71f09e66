//! Producer Supervisor
//!
//! Keeps one `BatchingProducer` fed from a `RecordSource`, reconnecting on transient faults
//! instead of restarting the whole producer.
//!
//! ## Fault handling
//! - **Transient** (disconnect, transport error): the unflushed buffer is discarded and
//!   counted as lost, then the supervisor backs off and reconnects.
//! - **Fatal**, or too many consecutive failures: the supervisor stops with an error.
//! - **Clean end of source**: the remaining buffer is flushed and the supervisor returns.
//!
//! With a flush interval set, a partial buffer is flushed whole once its oldest record has
//! waited that long, so a slow trickle of records cannot sit in memory indefinitely.

use super::batcher::{BatchingProducer, ProducerError};
use crate::source::types::SourceError;
use crate::source::{RecordSource, RecordStream};
use crate::stats::PipelineStats;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub flush_interval: Option<Duration>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// `None` retries transient faults forever.
    pub max_consecutive_failures: Option<u32>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            flush_interval: Some(Duration::from_secs(5)),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_consecutive_failures: None,
        }
    }
}

pub struct ProducerSupervisor {
    source: Arc<dyn RecordSource>,
    producer: BatchingProducer,
    options: SupervisorOptions,
    stats: Arc<PipelineStats>,
}

/// Why a connected session ended.
enum SessionEnd {
    SourceFinished,
    Fault(SourceError),
}

impl ProducerSupervisor {
    pub fn new(
        source: Arc<dyn RecordSource>,
        producer: BatchingProducer,
        options: SupervisorOptions,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            source,
            producer,
            options,
            stats,
        }
    }

    /// Runs until the source finishes cleanly or a fault is classified as fatal.
    pub async fn run(&mut self) -> Result<()> {
        let mut failures = 0u32;
        let mut backoff = self.options.initial_backoff;

        loop {
            let fault = match self.source.connect().await {
                Ok(stream) => {
                    match self.pump(stream, &mut failures, &mut backoff).await {
                        SessionEnd::SourceFinished => {
                            self.flush_logged().await;
                            tracing::info!("Record source finished, producer stopping");
                            return Ok(());
                        }
                        SessionEnd::Fault(fault) => fault,
                    }
                }
                Err(fault) => fault,
            };

            if !fault.is_transient() {
                let lost = self.producer.discard_pending();
                tracing::error!("Fatal source fault, {} buffered records lost: {}", lost, fault);
                return Err(fault.into());
            }

            let lost = self.producer.discard_pending();
            failures += 1;
            self.stats.source_reconnects.inc();
            tracing::warn!(
                "Source fault ({} consecutive), {} buffered records lost: {}",
                failures,
                lost,
                fault
            );

            if let Some(limit) = self.options.max_consecutive_failures {
                if failures >= limit {
                    anyhow::bail!(
                        "giving up after {} consecutive source faults: {}",
                        failures,
                        fault
                    );
                }
            }

            let jitter = rand::random::<u64>() % 50;
            tokio::time::sleep(backoff + Duration::from_millis(jitter)).await;
            backoff = (backoff * 2).min(self.options.max_backoff);
        }
    }

    /// Moves records from one connected stream into the producer.
    async fn pump(
        &mut self,
        mut stream: Box<dyn RecordStream>,
        failures: &mut u32,
        backoff: &mut Duration,
    ) -> SessionEnd {
        loop {
            let deadline = self.flush_deadline();

            let next = tokio::select! {
                next = stream.next_record() => Some(next),
                _ = sleep_until_opt(deadline) => None,
            };

            let Some(next) = next else {
                tracing::debug!(
                    "Flush interval elapsed with {} pending records",
                    self.producer.pending()
                );
                self.flush_logged().await;
                continue;
            };

            match next {
                Ok(Some(record)) => {
                    // A record got through, so the connection is healthy again.
                    *failures = 0;
                    *backoff = self.options.initial_backoff;
                    if let Err(e) = self.producer.ingest(record).await {
                        log_producer_error(&e);
                    }
                }
                Ok(None) => return SessionEnd::SourceFinished,
                Err(fault) => return SessionEnd::Fault(fault),
            }
        }
    }

    fn flush_deadline(&self) -> Option<tokio::time::Instant> {
        let interval = self.options.flush_interval?;
        let oldest = self.producer.oldest_pending_since()?;
        Some(oldest + interval)
    }

    async fn flush_logged(&mut self) {
        if let Err(e) = self.producer.flush().await {
            log_producer_error(&e);
        }
    }
}

fn log_producer_error(e: &ProducerError) {
    // Dropped batches are already counted by the producer.
    tracing::error!("Producer flush failed: {}", e);
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
