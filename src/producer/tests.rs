//! Producer Module Tests
//!
//! ## Test Scopes
//! - **Batching**: Batch size bound, arrival order, no record in two batches.
//! - **Partition keys**: Location when present, default otherwise.
//! - **Bulk put failures**: Retry, then drop without losing later records.
//! - **Supervisor**: Reconnect on transient faults, stop on fatal ones, time-based flush.

#[cfg(test)]
mod tests {
    use crate::log::memory::MemoryLog;
    use crate::log::types::{LogEntry, LogError, PutAck, PutRecordEntry};
    use crate::log::AppendLog;
    use crate::producer::batcher::{
        partition_key, BatchingProducer, ProducerError, ProducerOptions,
    };
    use crate::producer::supervisor::{ProducerSupervisor, SupervisorOptions};
    use crate::source::stream::channel_source;
    use crate::source::types::{Record, SourceError};
    use crate::source::{RecordSource, RecordStream};
    use crate::stats::PipelineStats;

    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn record(id: u64) -> Record {
        Record {
            id,
            text: format!("record {}", id),
            created_at: "Mon Jan 01 00:00:00 +0000 2018".to_string(),
            location: None,
        }
    }

    fn options(batch_size: usize) -> ProducerOptions {
        ProducerOptions {
            batch_size,
            default_partition_key: "unknown".to_string(),
            put_attempts: 3,
            retry_delay: Duration::from_millis(1),
            max_retry_delay: Duration::from_millis(2),
        }
    }

    fn single_shard_log() -> Arc<MemoryLog> {
        Arc::new(MemoryLog::new(1, Duration::from_secs(3600)))
    }

    async fn logged_ids(log: &MemoryLog) -> Vec<u64> {
        let entries: Vec<LogEntry> = log.read(0, None, 10_000).await.unwrap();
        entries
            .iter()
            .map(|e| serde_json::from_slice::<Record>(&e.data).unwrap().id)
            .collect()
    }

    /// Fails the first `fail_first` puts, then delegates to an in-memory log.
    struct FlakyLog {
        inner: MemoryLog,
        fail_first: usize,
        calls: AtomicUsize,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl FlakyLog {
        fn new(fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryLog::new(1, Duration::from_secs(3600)),
                fail_first,
                calls: AtomicUsize::new(0),
                batch_sizes: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AppendLog for FlakyLog {
        async fn put_records(&self, entries: Vec<PutRecordEntry>) -> Result<PutAck, LogError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(LogError::Unavailable("throttled".to_string()));
            }
            self.batch_sizes.lock().unwrap().push(entries.len());
            self.inner.put_records(entries).await
        }

        fn shard_ids(&self) -> Vec<u32> {
            self.inner.shard_ids()
        }

        async fn read(
            &self,
            shard: u32,
            after: Option<u64>,
            limit: usize,
        ) -> Result<Vec<LogEntry>, LogError> {
            self.inner.read(shard, after, limit).await
        }

        async fn checkpoint(&self, subscriber: &str, shard: u32) -> Option<u64> {
            self.inner.checkpoint(subscriber, shard).await
        }

        async fn commit(
            &self,
            subscriber: &str,
            shard: u32,
            sequence: u64,
        ) -> Result<(), LogError> {
            self.inner.commit(subscriber, shard, sequence).await
        }
    }

    enum Step {
        Emit(Record),
        Fault(SourceError),
        End,
    }

    /// Each `connect` plays the next scripted session; no sessions left is fatal.
    struct ScriptedSource {
        sessions: Mutex<VecDeque<Vec<Step>>>,
        connects: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(sessions: Vec<Vec<Step>>) -> Arc<Self> {
            Arc::new(Self {
                sessions: Mutex::new(sessions.into_iter().collect()),
                connects: AtomicUsize::new(0),
            })
        }
    }

    struct ScriptedStream {
        steps: VecDeque<Step>,
    }

    #[async_trait]
    impl RecordSource for ScriptedSource {
        async fn connect(&self) -> Result<Box<dyn RecordStream>, SourceError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            match self.sessions.lock().unwrap().pop_front() {
                Some(steps) => Ok(Box::new(ScriptedStream {
                    steps: steps.into_iter().collect(),
                })),
                None => Err(SourceError::Fatal("script exhausted".to_string())),
            }
        }
    }

    #[async_trait]
    impl RecordStream for ScriptedStream {
        async fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
            match self.steps.pop_front() {
                Some(Step::Emit(record)) => Ok(Some(record)),
                Some(Step::Fault(fault)) => Err(fault),
                Some(Step::End) | None => Ok(None),
            }
        }
    }

    fn fast_supervisor_options() -> SupervisorOptions {
        SupervisorOptions {
            flush_interval: None,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            max_consecutive_failures: None,
        }
    }

    // ============================================================
    // BATCHING
    // ============================================================

    #[tokio::test]
    async fn test_batches_are_bounded_ordered_and_disjoint() {
        // ARRANGE
        let log = FlakyLog::new(0);
        let stats = Arc::new(PipelineStats::default());
        let mut producer = BatchingProducer::new(log.clone(), options(10), stats.clone());

        // ACT: 25 records -> two full flushes, 5 pending
        let mut flushes = 0;
        for id in 0..25 {
            if producer.ingest(record(id)).await.unwrap().is_some() {
                flushes += 1;
            }
        }

        // ASSERT
        assert_eq!(flushes, 2);
        assert_eq!(producer.pending(), 5);
        assert_eq!(*log.batch_sizes.lock().unwrap(), vec![10, 10]);

        producer.flush().await.unwrap();
        assert_eq!(producer.pending(), 0);
        assert_eq!(*log.batch_sizes.lock().unwrap(), vec![10, 10, 5]);

        let ids = logged_ids(&log.inner).await;
        assert_eq!(ids, (0..25).collect::<Vec<_>>());
        assert_eq!(stats.records_put.get(), 25);
        assert_eq!(stats.batches_put.get(), 3);
    }

    #[tokio::test]
    async fn test_flush_on_empty_buffer_is_noop() {
        let log = FlakyLog::new(0);
        let mut producer =
            BatchingProducer::new(log.clone(), options(10), Arc::new(PipelineStats::default()));

        assert!(producer.flush().await.unwrap().is_none());
        assert_eq!(log.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_flush_ack_covers_every_record() {
        let log = single_shard_log();
        let mut producer =
            BatchingProducer::new(log.clone(), options(3), Arc::new(PipelineStats::default()));

        producer.ingest(record(1)).await.unwrap();
        producer.ingest(record(2)).await.unwrap();
        let ack = producer.ingest(record(3)).await.unwrap().unwrap();

        assert_eq!(ack.records.len(), 3);
    }

    #[tokio::test]
    async fn test_buffer_refills_after_manual_flush() {
        let log = FlakyLog::new(0);
        let mut producer =
            BatchingProducer::new(log.clone(), options(3), Arc::new(PipelineStats::default()));

        producer.ingest(record(1)).await.unwrap();
        let partial = producer.flush().await.unwrap().unwrap();
        assert_eq!(partial.records.len(), 1);
        assert_eq!(producer.pending(), 0);

        for id in 2..5 {
            producer.ingest(record(id)).await.unwrap();
        }

        assert_eq!(producer.pending(), 0);
        assert_eq!(*log.batch_sizes.lock().unwrap(), vec![1, 3]);
        assert_eq!(logged_ids(&log.inner).await, vec![1, 2, 3, 4]);
    }

    // ============================================================
    // PARTITION KEYS
    // ============================================================

    #[test]
    fn test_partition_key_uses_location_or_default() {
        let mut r = record(1);
        assert_eq!(partition_key(&r, "unknown"), "unknown");

        r.location = Some("   ".to_string());
        assert_eq!(partition_key(&r, "unknown"), "unknown");

        r.location = Some(" Las Palmas ".to_string());
        assert_eq!(partition_key(&r, "unknown"), "Las Palmas");
    }

    #[tokio::test]
    async fn test_entries_carry_partition_keys() {
        let log = single_shard_log();
        let mut producer =
            BatchingProducer::new(log.clone(), options(2), Arc::new(PipelineStats::default()));

        let mut located = record(1);
        located.location = Some("Madrid".to_string());
        producer.ingest(located).await.unwrap();
        producer.ingest(record(2)).await.unwrap();

        let entries = log.read(0, None, 10).await.unwrap();
        let keys: Vec<&str> = entries.iter().map(|e| e.partition_key.as_str()).collect();
        assert_eq!(keys, vec!["Madrid", "unknown"]);
    }

    // ============================================================
    // BULK PUT FAILURES
    // ============================================================

    #[tokio::test]
    async fn test_put_is_retried_until_success() {
        let log = FlakyLog::new(2);
        let stats = Arc::new(PipelineStats::default());
        let mut producer = BatchingProducer::new(log.clone(), options(2), stats.clone());

        producer.ingest(record(1)).await.unwrap();
        let ack = producer.ingest(record(2)).await.unwrap();

        assert!(ack.is_some());
        assert_eq!(log.calls.load(Ordering::SeqCst), 3);
        assert_eq!(stats.put_failures.get(), 2);
        assert_eq!(stats.records_dropped.get(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_put_drops_batch_and_keeps_going() {
        // ARRANGE: the first 3 puts fail, i.e. every attempt of the first batch
        let log = FlakyLog::new(3);
        let stats = Arc::new(PipelineStats::default());
        let mut producer = BatchingProducer::new(log.clone(), options(2), stats.clone());

        // ACT
        producer.ingest(record(1)).await.unwrap();
        let result = producer.ingest(record(2)).await;

        // ASSERT: dropped and reported, buffer reset
        match result {
            Err(ProducerError::PutFailed { dropped, attempts, .. }) => {
                assert_eq!(dropped, 2);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected PutFailed, got {:?}", other),
        }
        assert_eq!(producer.pending(), 0);
        assert_eq!(stats.records_dropped.get(), 2);

        // Later records still flow
        producer.ingest(record(3)).await.unwrap();
        producer.ingest(record(4)).await.unwrap();
        assert_eq!(logged_ids(&log.inner).await, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_discard_pending_counts_lost_records() {
        let log = single_shard_log();
        let stats = Arc::new(PipelineStats::default());
        let mut producer = BatchingProducer::new(log.clone(), options(10), stats.clone());

        for id in 0..4 {
            producer.ingest(record(id)).await.unwrap();
        }

        assert_eq!(producer.discard_pending(), 4);
        assert_eq!(producer.pending(), 0);
        assert_eq!(stats.records_lost.get(), 4);
        assert!(producer.oldest_pending_since().is_none());
    }

    // ============================================================
    // SUPERVISOR
    // ============================================================

    #[tokio::test]
    async fn test_supervisor_reconnects_after_transient_fault() {
        // ARRANGE: first session drops after 3 records, second delivers a full batch
        let mut second: Vec<Step> = (10..20).map(|id| Step::Emit(record(id))).collect();
        second.push(Step::End);
        let source = ScriptedSource::new(vec![
            vec![
                Step::Emit(record(1)),
                Step::Emit(record(2)),
                Step::Emit(record(3)),
                Step::Fault(SourceError::Disconnected("reset by peer".to_string())),
            ],
            second,
        ]);
        let log = single_shard_log();
        let stats = Arc::new(PipelineStats::default());
        let producer = BatchingProducer::new(log.clone(), options(10), stats.clone());
        let mut supervisor = ProducerSupervisor::new(
            source.clone(),
            producer,
            fast_supervisor_options(),
            stats.clone(),
        );

        // ACT
        supervisor.run().await.unwrap();

        // ASSERT: buffered records at the fault are lost, the rest arrive intact
        assert_eq!(source.connects.load(Ordering::SeqCst), 2);
        assert_eq!(stats.source_reconnects.get(), 1);
        assert_eq!(stats.records_lost.get(), 3);
        assert_eq!(logged_ids(&log).await, (10..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_supervisor_flushes_remainder_on_clean_end() {
        let source = ScriptedSource::new(vec![vec![
            Step::Emit(record(1)),
            Step::Emit(record(2)),
            Step::End,
        ]]);
        let log = single_shard_log();
        let stats = Arc::new(PipelineStats::default());
        let producer = BatchingProducer::new(log.clone(), options(10), stats.clone());
        let mut supervisor =
            ProducerSupervisor::new(source, producer, fast_supervisor_options(), stats.clone());

        supervisor.run().await.unwrap();

        assert_eq!(logged_ids(&log).await, vec![1, 2]);
        assert_eq!(stats.records_put.get(), 2);
        assert_eq!(stats.records_lost.get(), 0);
    }

    #[tokio::test]
    async fn test_supervisor_stops_on_fatal_fault() {
        let source = ScriptedSource::new(vec![vec![
            Step::Emit(record(1)),
            Step::Fault(SourceError::Fatal("401 Unauthorized".to_string())),
        ]]);
        let log = single_shard_log();
        let stats = Arc::new(PipelineStats::default());
        let producer = BatchingProducer::new(log.clone(), options(10), stats.clone());
        let mut supervisor = ProducerSupervisor::new(
            source.clone(),
            producer,
            fast_supervisor_options(),
            stats.clone(),
        );

        let result = supervisor.run().await;

        assert!(result.is_err());
        assert_eq!(source.connects.load(Ordering::SeqCst), 1);
        assert_eq!(stats.records_lost.get(), 1);
    }

    #[tokio::test]
    async fn test_supervisor_gives_up_after_consecutive_failures() {
        let source = ScriptedSource::new(vec![
            vec![Step::Fault(SourceError::Transport("timeout".to_string()))],
            vec![Step::Fault(SourceError::Transport("timeout".to_string()))],
            vec![Step::Fault(SourceError::Transport("timeout".to_string()))],
        ]);
        let stats = Arc::new(PipelineStats::default());
        let producer = BatchingProducer::new(single_shard_log(), options(10), stats.clone());
        let mut opts = fast_supervisor_options();
        opts.max_consecutive_failures = Some(2);
        let mut supervisor = ProducerSupervisor::new(source.clone(), producer, opts, stats);

        let err = supervisor.run().await.unwrap_err();

        assert!(err.to_string().contains("2 consecutive"));
        assert_eq!(source.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_based_flush_emits_partial_batch_whole() {
        // ARRANGE: a trickle of 3 records on a source that stays open
        let (tx, source) = channel_source(16);
        for id in 1..=3 {
            tx.send(record(id)).await.unwrap();
        }
        let log = single_shard_log();
        let stats = Arc::new(PipelineStats::default());
        let producer = BatchingProducer::new(log.clone(), options(10), stats.clone());
        let mut opts = fast_supervisor_options();
        opts.flush_interval = Some(Duration::from_secs(5));
        let mut supervisor =
            ProducerSupervisor::new(Arc::new(source), producer, opts, stats.clone());

        let task = tokio::spawn(async move { supervisor.run().await });

        // ACT
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(logged_ids(&log).await.is_empty(), "flushed before the interval");
        tokio::time::sleep(Duration::from_secs(5)).await;

        // ASSERT: one batch holding all three
        assert_eq!(logged_ids(&log).await, vec![1, 2, 3]);
        assert_eq!(stats.batches_put.get(), 1);

        drop(tx);
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_flush_interval_partial_batch_waits() {
        let (tx, source) = channel_source(16);
        tx.send(record(1)).await.unwrap();
        let log = single_shard_log();
        let stats = Arc::new(PipelineStats::default());
        let producer = BatchingProducer::new(log.clone(), options(10), stats.clone());
        let mut supervisor = ProducerSupervisor::new(
            Arc::new(source),
            producer,
            fast_supervisor_options(),
            stats.clone(),
        );

        let task = tokio::spawn(async move { supervisor.run().await });
        tokio::time::sleep(Duration::from_secs(3600)).await;

        assert!(logged_ids(&log).await.is_empty());

        // Closing the source flushes what is left.
        drop(tx);
        task.await.unwrap().unwrap();
        assert_eq!(logged_ids(&log).await, vec![1]);
    }
}
