//! Pipeline Counters
//!
//! Lock-free counters shared by every stage. They are cheap enough to bump on the hot path
//! and are exposed through `GET /stats` and the periodic stats reporter.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    // producer
    pub records_ingested: Counter,
    pub batches_put: Counter,
    pub records_put: Counter,
    pub put_failures: Counter,
    pub records_dropped: Counter,
    pub records_lost: Counter,
    pub source_reconnects: Counter,
    // delivery
    pub batches_delivered: Counter,
    pub delivery_failures: Counter,
    pub batches_abandoned: Counter,
    // consumer
    pub records_skipped: Counter,
    pub sentiment_rows: Counter,
    pub entity_rows: Counter,
    pub objects_written: Counter,
}

/// Point-in-time copy of `PipelineStats`, serialized by the `/stats` endpoint.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub records_ingested: u64,
    pub batches_put: u64,
    pub records_put: u64,
    pub put_failures: u64,
    pub records_dropped: u64,
    pub records_lost: u64,
    pub source_reconnects: u64,
    pub batches_delivered: u64,
    pub delivery_failures: u64,
    pub batches_abandoned: u64,
    pub records_skipped: u64,
    pub sentiment_rows: u64,
    pub entity_rows: u64,
    pub objects_written: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_ingested: self.records_ingested.get(),
            batches_put: self.batches_put.get(),
            records_put: self.records_put.get(),
            put_failures: self.put_failures.get(),
            records_dropped: self.records_dropped.get(),
            records_lost: self.records_lost.get(),
            source_reconnects: self.source_reconnects.get(),
            batches_delivered: self.batches_delivered.get(),
            delivery_failures: self.delivery_failures.get(),
            batches_abandoned: self.batches_abandoned.get(),
            records_skipped: self.records_skipped.get(),
            sentiment_rows: self.sentiment_rows.get(),
            entity_rows: self.entity_rows.get(),
            objects_written: self.objects_written.get(),
        }
    }
}
