//! Record Source Data Types

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One short text record as emitted by the feed.
///
/// Immutable once ingested. This is also the JSON shape the producer writes into the
/// append log, so the consumer parses exactly these field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    #[serde(default)]
    pub text: String,
    /// Feed timestamp, `"Dow Mon DD HH:MM:SS +0000 YYYY"`.
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Faults raised while connecting to or reading from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The connection closed or dropped; reconnecting is expected to help.
    #[error("source disconnected: {0}")]
    Disconnected(String),
    /// A transport-level failure (timeouts, resets, 5xx, throttling).
    #[error("source transport error: {0}")]
    Transport(String),
    /// Reconnecting will not help (bad credentials, bad URL, 4xx).
    #[error("fatal source error: {0}")]
    Fatal(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, SourceError::Fatal(_))
    }
}
