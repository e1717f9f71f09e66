//! Sink Writer
//!
//! Persists one buffer as one object named
//! `<folder>/<3-digit random>-<ISO-8601 UTC timestamp>.json`.
//!
//! The random prefix spreads keys across listing prefixes and makes same-instant clashes
//! unlikely, but it does not guarantee uniqueness. When a name is already taken the writer
//! appends a random suffix and tries again instead of failing or overwriting.

use super::{ObjectStore, PutOutcome, SinkError};

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

const MAX_NAME_ATTEMPTS: usize = 4;

#[derive(Clone)]
pub struct SinkWriter {
    store: Arc<dyn ObjectStore>,
}

impl SinkWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Writes `buffer` as a new object under `folder` and returns its name.
    pub async fn write(&self, folder: &str, buffer: Vec<u8>) -> Result<String, SinkError> {
        let base = object_name(folder, rand::random::<u32>(), Utc::now());
        let mut name = base.clone();

        for attempt in 1..=MAX_NAME_ATTEMPTS {
            match self.store.put_new(&name, buffer.clone()).await? {
                PutOutcome::Created => {
                    tracing::debug!("Wrote object {} ({} bytes)", name, buffer.len());
                    return Ok(name);
                }
                PutOutcome::AlreadyExists => {
                    tracing::warn!(
                        "Object name {} already taken (attempt {}), disambiguating",
                        name,
                        attempt
                    );
                    name = with_suffix(&base, &short_suffix());
                }
            }
        }

        Err(SinkError::Collision {
            folder: folder.to_string(),
            attempts: MAX_NAME_ATTEMPTS,
        })
    }
}

pub fn object_name(folder: &str, random: u32, at: DateTime<Utc>) -> String {
    format!(
        "{}/{:03}-{}.json",
        folder.trim_matches('/'),
        random % 1000,
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    )
}

fn with_suffix(name: &str, suffix: &str) -> String {
    match name.strip_suffix(".json") {
        Some(stem) => format!("{}-{}.json", stem, suffix),
        None => format!("{}-{}", name, suffix),
    }
}

fn short_suffix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
