//! Batch Consumer Module
//!
//! The second pipeline stage. Each delivered batch becomes at most two immutable NDJSON
//! objects: one sentiment row per surviving record, one entity row per detected entity.
//!
//! ## Processing Steps
//! 1. **Decode**: Base64 + JSON per item. Malformed items, items without an id and items
//!    with an unparsable timestamp are skipped, not fatal.
//! 2. **Derive**: `tweet_date` is the UTC rendering of `created_at`; missing text is `""`.
//! 3. **Analyze**: Exactly one sentiment call and one entity call for the whole batch, with
//!    results aligned to inputs by position.
//! 4. **Flatten & Write**: NDJSON buffers, each persisted as one new object.
//!
//! ## Submodules
//! - **`decode`**: Payload decoding and timestamp normalization.
//! - **`flatten`**: Output row types and NDJSON serialization.
//! - **`handler`**: `BatchConsumer`, the `BatchHandler` the delivery workers invoke.

pub mod decode;
pub mod flatten;
pub mod handler;

use crate::analysis::types::AnalysisError;
use crate::sink::SinkError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("{call} returned {actual} results for {expected} texts")]
    ResultCountMismatch {
        call: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("failed to serialize output rows: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write to {folder}: {source}")]
    Write {
        folder: String,
        #[source]
        source: SinkError,
    },
}
