//! Producer Module
//!
//! Buffers incoming records and emits fixed-size batches into the append log.
//!
//! ## Submodules
//! - **`batcher`**: `BatchingProducer`, the owned buffer plus the bulk-put path.
//! - **`supervisor`**: The reconnect loop around a `RecordSource`, including the
//!   time-based flush.

pub mod batcher;
pub mod supervisor;

#[cfg(test)]
mod tests;
