//! Sink Module
//!
//! Durable, write-once output. Every call creates exactly one immutable object; nothing is
//! appended to or rewritten in place.
//!
//! ## Submodules
//! - **`writer`**: `SinkWriter`, object naming and collision handling.
//! - **`fs`**: Object store on the local filesystem, one file per object.
//! - **`memory`**: In-process object store.

pub mod fs;
pub mod memory;
pub mod writer;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    /// The key was taken; the existing object is left untouched.
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid object key {0:?}")]
    InvalidKey(String),
    #[error("i/o error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no free object name under {folder} after {attempts} attempts")]
    Collision { folder: String, attempts: usize },
    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates `key` holding `body`. Never overwrites an existing object.
    async fn put_new(&self, key: &str, body: Vec<u8>) -> Result<PutOutcome, SinkError>;
}

/// Keys are `/`-separated relative paths without empty, `.` or `..` segments.
pub fn validate_key(key: &str) -> Result<(), SinkError> {
    let valid = !key.is_empty()
        && !key.starts_with('/')
        && key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if valid {
        Ok(())
    } else {
        Err(SinkError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests;
