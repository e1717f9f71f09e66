use super::types::Record;

use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Accepts either a single record or an array of records.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RecordsPayload {
    One(Record),
    Many(Vec<Record>),
}

#[derive(Debug, Serialize)]
pub struct AcceptResponse {
    pub accepted: usize,
    pub status: String,
}

pub async fn handle_post_records(
    Extension(sender): Extension<mpsc::Sender<Record>>,
    Json(payload): Json<RecordsPayload>,
) -> (StatusCode, Json<AcceptResponse>) {
    let records = match payload {
        RecordsPayload::One(record) => vec![record],
        RecordsPayload::Many(records) => records,
    };

    let mut accepted = 0;
    for record in records {
        if sender.send(record).await.is_err() {
            tracing::error!("Producer is not accepting records (accepted {} so far)", accepted);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(AcceptResponse {
                    accepted,
                    status: "producer_unavailable".to_string(),
                }),
            );
        }
        accepted += 1;
    }

    tracing::debug!("Accepted {} records over HTTP", accepted);

    (
        StatusCode::ACCEPTED,
        Json(AcceptResponse {
            accepted,
            status: "accepted".to_string(),
        }),
    )
}
