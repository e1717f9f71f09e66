//! HTTP Analysis Client
//!
//! Talks to the NLP capability over JSON:
//! - `POST {endpoint}/detect-sentiment` and `POST {endpoint}/detect-entities`
//! - request: `{"texts": [...], "language_code": "en"}`
//! - response: `{"result_list": [{"index": 0, ...}], "error_list": [{"index": 1, ...}]}`
//!
//! Results are put back in input order by `index`. Any per-text error or a gap in the
//! indices fails the whole call, since a partial list could not be correlated safely.

use super::types::*;
use super::AnalysisClient;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    texts: &'a [String],
    language_code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub struct BatchResponse<T> {
    #[serde(default = "Vec::new")]
    pub result_list: Vec<Indexed<T>>,
    #[serde(default)]
    pub error_list: Vec<ItemError>,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub struct Indexed<T> {
    pub index: usize,
    #[serde(flatten)]
    pub item: T,
}

pub struct HttpAnalysisClient {
    endpoint: String,
    http_client: reqwest::Client,
    timeout: Duration,
    attempts: usize,
}

impl HttpAnalysisClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            timeout: Duration::from_secs(20),
            attempts: 3,
        }
    }

    pub fn with_retry(mut self, timeout: Duration, attempts: usize) -> Self {
        self.timeout = timeout;
        self.attempts = attempts.max(1);
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        call: &'static str,
        path: &str,
        texts: &[String],
        language: &str,
    ) -> Result<Vec<T>, AnalysisError> {
        let url = format!("{}{}", self.endpoint, path);
        let payload = BatchRequest {
            texts,
            language_code: language,
        };

        let response = self.post_with_retry(call, &url, &payload).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status {
                call,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: BatchResponse<T> = response.json().await.map_err(|e| AnalysisError::Decode {
            call,
            reason: e.to_string(),
        })?;

        tracing::debug!(
            "{} returned {} results for {} texts",
            call,
            parsed.result_list.len(),
            texts.len()
        );

        realign(call, parsed)
    }

    /// Retries transport failures and 5xx/429 responses with backoff and jitter.
    async fn post_with_retry<P: Serialize>(
        &self,
        call: &'static str,
        url: &str,
        payload: &P,
    ) -> Result<reqwest::Response, AnalysisError> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let last = attempt + 1 == self.attempts;
            let response = self
                .http_client
                .post(url)
                .json(payload)
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let retryable = status.is_server_error()
                        || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
                    if !retryable || last {
                        return Ok(resp);
                    }
                    tracing::warn!("{} got {} (attempt {}), retrying", call, status, attempt + 1);
                }
                Err(e) => {
                    if last {
                        return Err(AnalysisError::Transport {
                            call,
                            reason: e.to_string(),
                        });
                    }
                    tracing::warn!("{} transport error (attempt {}): {}", call, attempt + 1, e);
                }
            }

            // Simple jitter to prevent thundering herd
            let jitter = rand::random::<u64>() % 50;
            tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
            delay_ms = (delay_ms * 2).min(1200);
        }

        Err(AnalysisError::Transport {
            call,
            reason: "retry attempts exhausted".to_string(),
        })
    }
}

/// Orders results by `index` and rejects per-item errors and non-contiguous indices.
///
/// The returned length is left for the caller to check against its input count.
pub fn realign<T>(
    call: &'static str,
    response: BatchResponse<T>,
) -> Result<Vec<T>, AnalysisError> {
    if !response.error_list.is_empty() {
        return Err(AnalysisError::ItemErrors {
            call,
            errors: response.error_list,
        });
    }

    let mut indexed = response.result_list;
    indexed.sort_by_key(|r| r.index);

    indexed
        .into_iter()
        .enumerate()
        .map(|(position, r)| {
            if r.index == position {
                Ok(r.item)
            } else {
                Err(AnalysisError::Misaligned {
                    call,
                    position,
                    index: r.index,
                })
            }
        })
        .collect()
}

#[async_trait]
impl AnalysisClient for HttpAnalysisClient {
    async fn detect_sentiment(
        &self,
        texts: &[String],
        language: &str,
    ) -> Result<Vec<SentimentResult>, AnalysisError> {
        self.call(DETECT_SENTIMENT, "/detect-sentiment", texts, language)
            .await
    }

    async fn detect_entities(
        &self,
        texts: &[String],
        language: &str,
    ) -> Result<Vec<EntityResult>, AnalysisError> {
        self.call(DETECT_ENTITIES, "/detect-entities", texts, language)
            .await
    }
}
