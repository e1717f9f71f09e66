//! Record Source Module
//!
//! The upstream edge of the pipeline: anything that emits short text records over time.
//!
//! ## Seams
//! - **`RecordSource`**: something the producer can (re)connect to.
//! - **`RecordStream`**: one live connection, yielding records until it ends or faults.
//!
//! ## Submodules
//! - **`types`**: The `Record` wire shape and the `SourceError` fault taxonomy.
//! - **`stream`**: Channel-backed and HTTP line-stream implementations.
//! - **`handlers`**: `POST /records`, which feeds the channel source.

pub mod handlers;
pub mod stream;
pub mod types;

use async_trait::async_trait;
use types::{Record, SourceError};

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Opens a new connection. Called again by the supervisor after every transient fault.
    async fn connect(&self) -> Result<Box<dyn RecordStream>, SourceError>;
}

#[async_trait]
pub trait RecordStream: Send {
    /// `Ok(None)` means the source finished cleanly and will never yield again.
    async fn next_record(&mut self) -> Result<Option<Record>, SourceError>;
}
