//! Analysis Data Types
//!
//! Typed contract of the bulk NLP capability. For an input list of N texts, each call
//! returns N results, where result `i` describes text `i`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
    Mixed,
}

/// Per-class confidences, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentScores {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
    pub mixed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub sentiment: Sentiment,
    pub scores: SentimentScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEntity {
    pub text: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub score: f64,
}

/// Entities of one text, in detection order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityResult {
    #[serde(default)]
    pub entities: Vec<DetectedEntity>,
}

/// A per-text failure reported by the capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemError {
    pub index: usize,
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{call}: transport error: {reason}")]
    Transport { call: &'static str, reason: String },
    #[error("{call}: capability returned {status}: {body}")]
    Status {
        call: &'static str,
        status: u16,
        body: String,
    },
    #[error("{call}: undecodable response: {reason}")]
    Decode { call: &'static str, reason: String },
    #[error("{call}: texts failed analysis: {errors:?}")]
    ItemErrors {
        call: &'static str,
        errors: Vec<ItemError>,
    },
    #[error("{call}: result at position {position} carries index {index}")]
    Misaligned {
        call: &'static str,
        position: usize,
        index: usize,
    },
}

pub const DETECT_SENTIMENT: &str = "detect_sentiment";
pub const DETECT_ENTITIES: &str = "detect_entities";
