//! Batch AML risk-scoring pipeline.
//!
//! The pipeline turns regulatory transaction-export files into persisted
//! risk assessments:
//!
//!   1. `ingest` discovers export files and loads raw records
//!   2. `normalizer` maps exporter field variants onto the canonical model
//!   3. `profiles` scores each transaction on five weighted risk axes
//!   4. `graph` accumulates the client relationship network as it goes
//!   5. `aggregator` combines sub-scores into one classified verdict
//!   6. `scheduler` runs batches across a fixed worker pool with bounded
//!      retry, and `store` persists everything idempotently
//!
//! The `store` owns all SQL; everything above it is storage-agnostic.

pub mod aggregator;
pub mod batch;
pub mod clients;
pub mod config;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod metrics;
pub mod normalizer;
pub mod profiles;
pub mod record;
pub mod scheduler;
pub mod store;
pub mod types;

pub use config::RunConfig;
pub use error::{AmlError, AmlResult, SchemaError};
pub use scheduler::{run, CancelToken, RunSummary};
pub use store::AmlStore;
