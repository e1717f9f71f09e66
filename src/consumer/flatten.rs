//! Flattening
//!
//! Joins analysis results back onto their inputs by position and emits single-level rows
//! for line-oriented storage: one sentiment row per record, one entity row per detected
//! entity in detection order.

use super::decode::AnalysisInput;
use super::ConsumerError;
use crate::analysis::types::{
    EntityResult, Sentiment, SentimentResult, DETECT_ENTITIES, DETECT_SENTIMENT,
};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatSentimentRow {
    pub tweet_id: u64,
    pub tweet_text: String,
    pub tweet_date: String,
    pub sentiment: Sentiment,
    pub positive_score: f64,
    pub negative_score: f64,
    pub mixed_score: f64,
    pub neutral_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatEntityRow {
    pub tweet_id: u64,
    pub tweet_text: String,
    pub tweet_date: String,
    pub entity: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub score: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FlatRows {
    pub sentiment: Vec<FlatSentimentRow>,
    pub entities: Vec<FlatEntityRow>,
}

/// Fails without producing any row when either result list does not match the inputs.
pub fn flatten(
    inputs: &[AnalysisInput],
    sentiments: Vec<SentimentResult>,
    entities: Vec<EntityResult>,
) -> Result<FlatRows, ConsumerError> {
    check_count(DETECT_SENTIMENT, inputs.len(), sentiments.len())?;
    check_count(DETECT_ENTITIES, inputs.len(), entities.len())?;

    let mut rows = FlatRows {
        sentiment: Vec::with_capacity(inputs.len()),
        entities: Vec::new(),
    };

    for ((input, sentiment), detected) in inputs.iter().zip(sentiments).zip(entities) {
        rows.sentiment.push(FlatSentimentRow {
            tweet_id: input.id,
            tweet_text: input.text.clone(),
            tweet_date: input.tweet_date.clone(),
            sentiment: sentiment.sentiment,
            positive_score: sentiment.scores.positive,
            negative_score: sentiment.scores.negative,
            mixed_score: sentiment.scores.mixed,
            neutral_score: sentiment.scores.neutral,
        });

        rows.entities
            .extend(detected.entities.into_iter().map(|entity| FlatEntityRow {
                tweet_id: input.id,
                tweet_text: input.text.clone(),
                tweet_date: input.tweet_date.clone(),
                entity: entity.text,
                entity_type: entity.entity_type,
                score: entity.score,
            }));
    }

    Ok(rows)
}

fn check_count(call: &'static str, expected: usize, actual: usize) -> Result<(), ConsumerError> {
    if expected != actual {
        return Err(ConsumerError::ResultCountMismatch {
            call,
            expected,
            actual,
        });
    }
    Ok(())
}

/// One JSON object per line, each line newline-terminated.
pub fn to_ndjson<T: Serialize>(rows: &[T]) -> Result<Vec<u8>, serde_json::Error> {
    let mut buffer = Vec::with_capacity(rows.len() * 192);
    for row in rows {
        serde_json::to_writer(&mut buffer, row)?;
        buffer.push(b'\n');
    }
    Ok(buffer)
}
