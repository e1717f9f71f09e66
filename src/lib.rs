//! Streaming Text Analytics Library
//!
//! This library crate defines the core modules of a two-stage streaming pipeline.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! Records flow through loosely coupled stages, decoupled by the append log:
//!
//! - **`source`**: Where records come from. A push channel fed by `POST /records` or a
//!   newline-delimited JSON stream read over HTTP.
//! - **`producer`**: Buffers records into fixed-size batches and issues one bulk put per
//!   batch. A supervisor reconnects the source on transient faults.
//! - **`log`**: The sharded, retained append log with per-subscriber checkpoints and
//!   at-least-once delivery workers.
//! - **`consumer`**: Decodes delivered batches, calls the analysis capability once per
//!   kind, and flattens the results into NDJSON rows.
//! - **`analysis`**: Contract and HTTP client of the bulk sentiment / entity service.
//! - **`sink`**: Write-once object storage and object naming.
//! - **`config`** and **`stats`**: Runtime settings and pipeline counters.
//!
//! ## Durability
//! The append log is `log::memory::MemoryLog`, which lives in process memory only. Retained
//! entries and subscriber checkpoints are lost when the process exits, so records that were
//! put but not yet delivered do not survive a restart. Delivery is at-least-once within one
//! process lifetime. A durable log would plug in behind the `log::AppendLog` trait.

pub mod analysis;
pub mod config;
pub mod consumer;
pub mod log;
pub mod producer;
pub mod sink;
pub mod source;
pub mod stats;
