//! Record Decoding
//!
//! Turns delivered log items back into analysis inputs. Problems here are per-record: a bad
//! item is skipped with a reason and never fails its batch.

use crate::log::types::DeliveredRecord;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

/// Feed timestamp layout after the leading weekday, e.g. `Jan 01 00:00:00 +0000 2018`.
pub const SOURCE_TIMESTAMP_FORMAT: &str = "%b %d %H:%M:%S %z %Y";
/// Output layout, always UTC, e.g. `2018-01-01 00:00:00`.
pub const TWEET_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lenient view of a logged record, so a missing field can be told apart from bad JSON.
#[derive(Debug, Deserialize)]
struct LoggedRecord {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

/// One surviving record, ready for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisInput {
    pub id: u64,
    pub text: String,
    pub tweet_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotBase64(String),
    NotJson(String),
    MissingId,
    MissingTimestamp,
    BadTimestamp(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotBase64(e) => write!(f, "payload is not base64: {}", e),
            SkipReason::NotJson(e) => write!(f, "payload is not a record: {}", e),
            SkipReason::MissingId => write!(f, "record has no id"),
            SkipReason::MissingTimestamp => write!(f, "record has no created_at"),
            SkipReason::BadTimestamp(raw) => write!(f, "unparsable created_at {:?}", raw),
        }
    }
}

/// Decodes, validates and derives the analysis input for one delivered item.
pub fn decode_item(item: &DeliveredRecord) -> Result<AnalysisInput, SkipReason> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(item.data.as_bytes())
        .map_err(|e| SkipReason::NotBase64(e.to_string()))?;

    let record: LoggedRecord =
        serde_json::from_slice(&bytes).map_err(|e| SkipReason::NotJson(e.to_string()))?;

    let id = record.id.ok_or(SkipReason::MissingId)?;
    let raw_date = record.created_at.ok_or(SkipReason::MissingTimestamp)?;
    let tweet_date =
        normalize_timestamp(&raw_date).ok_or_else(|| SkipReason::BadTimestamp(raw_date.clone()))?;

    Ok(AnalysisInput {
        id,
        text: record.text.unwrap_or_default(),
        tweet_date,
    })
}

/// `Mon Jan 01 05:30:00 +0200 2018` -> `2018-01-01 03:30:00` (UTC).
///
/// The weekday is required but not checked against the date; feeds get it wrong.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let (weekday, rest) = raw.trim().split_once(' ')?;
    if weekday.is_empty() || !weekday.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    DateTime::parse_from_str(rest.trim_start(), SOURCE_TIMESTAMP_FORMAT)
        .ok()
        .map(|parsed| {
            parsed
                .with_timezone(&Utc)
                .format(TWEET_DATE_FORMAT)
                .to_string()
        })
}

/// Decodes a whole delivery, keeping survivors in delivery order.
///
/// Returns the inputs plus the number of skipped items.
pub fn prepare(items: &[DeliveredRecord]) -> (Vec<AnalysisInput>, usize) {
    let mut inputs = Vec::with_capacity(items.len());
    let mut skipped = 0;

    for item in items {
        match decode_item(item) {
            Ok(input) => inputs.push(input),
            Err(reason) => {
                skipped += 1;
                tracing::warn!("Skipping record at sequence {}: {}", item.sequence, reason);
            }
        }
    }

    (inputs, skipped)
}
