//! Analysis Capability Module
//!
//! The consumer's view of the external bulk NLP service: sentiment and named-entity
//! detection over a list of texts, in one call each. The model itself is opaque; only the
//! typed contract lives here.
//!
//! ## Submodules
//! - **`types`**: Results, scores, entities and `AnalysisError`.
//! - **`http`**: JSON-over-HTTP client with retry and index realignment.

pub mod http;
pub mod types;

use async_trait::async_trait;
use types::{AnalysisError, EntityResult, SentimentResult};

#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn detect_sentiment(
        &self,
        texts: &[String],
        language: &str,
    ) -> Result<Vec<SentimentResult>, AnalysisError>;

    async fn detect_entities(
        &self,
        texts: &[String],
        language: &str,
    ) -> Result<Vec<EntityResult>, AnalysisError>;
}
