//! Run counters and the monitoring seam.
//!
//! Counters are plain atomics bumped from worker and sink threads. The
//! `MetricsSink` trait is the integration point for an external monitoring
//! system; the default sink just logs, which is all a headless run needs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    BatchFailed,
    RunCompleted,
}

impl Alert {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alert::BatchFailed => "batch_failed",
            Alert::RunCompleted => "run_completed",
        }
    }
}

pub trait MetricsSink: Send + Sync {
    fn counter(&self, name: &'static str, value: u64);
    fn alert(&self, alert: Alert, detail: &str);
}

/// Default sink: everything goes to the log.
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn counter(&self, name: &'static str, value: u64) {
        log::debug!("metric {name}={value}");
    }

    fn alert(&self, alert: Alert, detail: &str) {
        match alert {
            Alert::BatchFailed => log::warn!("ALERT {}: {detail}", alert.as_str()),
            Alert::RunCompleted => log::info!("ALERT {}: {detail}", alert.as_str()),
        }
    }
}

/// Shared run counters. Cheap to bump from any thread.
pub struct RunMetrics {
    started: Instant,
    pub records_ingested: AtomicU64,
    pub records_skipped: AtomicU64,
    pub records_deduplicated: AtomicU64,
    pub batches_completed: AtomicU64,
    pub batches_failed: AtomicU64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            records_ingested: AtomicU64::new(0),
            records_skipped: AtomicU64::new(0),
            records_deduplicated: AtomicU64::new(0),
            batches_completed: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let elapsed = self.started.elapsed().as_secs_f64();
        let ingested = self.records_ingested.load(Ordering::Relaxed);
        MetricsSnapshot {
            records_ingested: ingested,
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            records_deduplicated: self.records_deduplicated.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            records_per_second: if elapsed > 0.0 { ingested as f64 / elapsed } else { 0.0 },
        }
    }

    /// Push every counter through the sink, typically at end of run.
    pub fn publish(&self, sink: &dyn MetricsSink) {
        let snap = self.snapshot();
        sink.counter("records_ingested", snap.records_ingested);
        sink.counter("records_skipped", snap.records_skipped);
        sink.counter("records_deduplicated", snap.records_deduplicated);
        sink.counter("batches_completed", snap.batches_completed);
        sink.counter("batches_failed", snap.batches_failed);
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub records_ingested: u64,
    pub records_skipped: u64,
    pub records_deduplicated: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub records_per_second: f64,
}
