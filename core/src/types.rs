//! Shared primitive types used across the entire pipeline.

/// The canonical run identifier (one ingestion run).
pub type RunId = String;

/// A stable client identifier (sender or receiver maincode).
pub type ClientId = String;

/// The per-run dedup key of a transaction record.
pub type ReferenceId = String;

/// Monotonic batch number within a run.
pub type BatchId = u64;
