//! Batch unit of work and its state machine.
//!
//! Legal transitions:
//!   pending -> processing          (dispatched to a worker)
//!   processing -> completed        (terminal)
//!   processing -> pending          (failure with retries left)
//!   processing -> failed           (terminal, retries exhausted)
//!
//! Everything here is pure; the scheduler drives the transitions.

use crate::types::BatchId;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchState::Pending => "pending",
            BatchState::Processing => "processing",
            BatchState::Completed => "completed",
            BatchState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Failed)
    }
}

/// One batch of raw records plus its lifecycle bookkeeping.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    /// Input file the records came from.
    pub source: String,
    pub records: Vec<Value>,
    pub state: BatchState,
    /// Processing attempts started so far.
    pub attempts: u32,
}

impl Batch {
    pub fn new(id: BatchId, source: String, records: Vec<Value>) -> Self {
        Self { id, source, records, state: BatchState::Pending, attempts: 0 }
    }

    /// pending -> processing. Counts the attempt.
    pub fn start(&mut self) {
        debug_assert_eq!(self.state, BatchState::Pending);
        self.state = BatchState::Processing;
        self.attempts += 1;
    }

    /// processing -> completed.
    pub fn complete(&mut self) {
        debug_assert_eq!(self.state, BatchState::Processing);
        self.state = BatchState::Completed;
    }

    /// Failure outcome: back to pending while attempts remain, otherwise
    /// terminal failed. Returns the resulting state.
    pub fn fail_attempt(&mut self, max_retries: u32) -> BatchState {
        debug_assert_eq!(self.state, BatchState::Processing);
        self.state = if self.attempts < max_retries {
            BatchState::Pending
        } else {
            BatchState::Failed
        };
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Batch {
        Batch::new(1, "export.json".to_string(), vec![])
    }

    #[test]
    fn happy_path() {
        let mut b = batch();
        assert_eq!(b.state, BatchState::Pending);
        b.start();
        assert_eq!(b.state, BatchState::Processing);
        assert_eq!(b.attempts, 1);
        b.complete();
        assert!(b.state.is_terminal());
        assert_eq!(b.state, BatchState::Completed);
    }

    #[test]
    fn failure_retries_until_exhausted() {
        let max_retries = 3;
        let mut b = batch();
        b.start();
        assert_eq!(b.fail_attempt(max_retries), BatchState::Pending);
        b.start();
        assert_eq!(b.fail_attempt(max_retries), BatchState::Pending);
        b.start();
        assert_eq!(b.attempts, 3);
        assert_eq!(b.fail_attempt(max_retries), BatchState::Failed);
        assert!(b.state.is_terminal());
    }

    #[test]
    fn single_attempt_config_fails_immediately() {
        let mut b = batch();
        b.start();
        assert_eq!(b.fail_attempt(1), BatchState::Failed);
    }
}
