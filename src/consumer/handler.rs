//! Batch Consumer
//!
//! Handles one delivered batch end to end: decode, one bulk sentiment call, one bulk entity
//! call, flatten, and one sink write per output family.
//!
//! An analysis failure or a result-count mismatch fails the whole batch before anything is
//! written. A sink failure fails the batch after earlier writes may already have landed; the
//! redelivery then writes a fresh pair of objects.

use super::decode::prepare;
use super::flatten::{flatten, to_ndjson};
use super::ConsumerError;
use crate::analysis::AnalysisClient;
use crate::log::subscriber::BatchHandler;
use crate::log::types::DeliveredBatch;
use crate::sink::writer::SinkWriter;
use crate::stats::PipelineStats;

use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    pub language_code: String,
    pub sentiment_folder: String,
    pub entities_folder: String,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            language_code: "en".to_string(),
            sentiment_folder: "sentiment".to_string(),
            entities_folder: "entities".to_string(),
        }
    }
}

/// What one successful invocation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub analyzed: usize,
    pub skipped: usize,
    pub sentiment_rows: usize,
    pub entity_rows: usize,
    pub sentiment_object: Option<String>,
    pub entities_object: Option<String>,
}

pub struct BatchConsumer {
    analysis: Arc<dyn AnalysisClient>,
    writer: SinkWriter,
    options: ConsumerOptions,
    stats: Arc<PipelineStats>,
}

impl BatchConsumer {
    pub fn new(
        analysis: Arc<dyn AnalysisClient>,
        writer: SinkWriter,
        options: ConsumerOptions,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            analysis,
            writer,
            options,
            stats,
        }
    }

    pub async fn process(&self, batch: &DeliveredBatch) -> Result<BatchReport, ConsumerError> {
        let (inputs, skipped) = prepare(&batch.records);
        self.stats.records_skipped.inc_by(skipped as u64);

        let mut report = BatchReport {
            analyzed: inputs.len(),
            skipped,
            ..BatchReport::default()
        };

        if inputs.is_empty() {
            tracing::debug!(
                "Shard {} batch has no analyzable records ({} skipped)",
                batch.shard,
                skipped
            );
            return Ok(report);
        }

        let texts: Vec<String> = inputs.iter().map(|input| input.text.clone()).collect();
        let language = self.options.language_code.as_str();

        let (sentiments, entities) = tokio::try_join!(
            self.analysis.detect_sentiment(&texts, language),
            self.analysis.detect_entities(&texts, language),
        )?;

        let rows = flatten(&inputs, sentiments, entities)?;
        report.sentiment_rows = rows.sentiment.len();
        report.entity_rows = rows.entities.len();

        let sentiment_buffer = to_ndjson(&rows.sentiment)?;
        let entities_buffer = to_ndjson(&rows.entities)?;

        let name = self
            .write(&self.options.sentiment_folder, sentiment_buffer)
            .await?;
        self.stats.sentiment_rows.inc_by(report.sentiment_rows as u64);
        report.sentiment_object = Some(name);

        // Written even when empty so every analyzed batch leaves a pair of objects.
        let name = self
            .write(&self.options.entities_folder, entities_buffer)
            .await?;
        self.stats.entity_rows.inc_by(report.entity_rows as u64);
        report.entities_object = Some(name);

        Ok(report)
    }

    async fn write(&self, folder: &str, buffer: Vec<u8>) -> Result<String, ConsumerError> {
        let name = self
            .writer
            .write(folder, buffer)
            .await
            .map_err(|source| ConsumerError::Write {
                folder: folder.to_string(),
                source,
            })?;
        self.stats.objects_written.inc();
        Ok(name)
    }
}

#[async_trait]
impl BatchHandler for BatchConsumer {
    async fn handle(&self, batch: DeliveredBatch) -> anyhow::Result<()> {
        let report = self.process(&batch).await?;

        tracing::info!(
            "Shard {} attempt {}: {} analyzed, {} skipped, {} sentiment rows, {} entity rows",
            batch.shard,
            batch.attempt,
            report.analyzed,
            report.skipped,
            report.sentiment_rows,
            report.entity_rows
        );
        Ok(())
    }
}
