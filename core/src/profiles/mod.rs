//! The five risk-profile evaluators behind a single trait.
//!
//! Evaluators are pure against their inputs: one transaction plus the
//! read-only evaluation context (configuration, client directory, graph).
//! They never perform I/O, never write shared state, and never block beyond
//! context lookups. An evaluator that cannot produce a meaningful score
//! (typically a client with no history) returns a `ProfileError`; the
//! aggregator absorbs it as a neutral score so one thin profile never
//! poisons the whole assessment.

mod behavioral;
mod customer;
mod geographic;
mod network;
mod transactional;

pub use behavioral::BehavioralProfile;
pub use customer::CustomerProfile;
pub use geographic::GeographicProfile;
pub use network::NetworkProfile;
pub use transactional::TransactionalProfile;

use crate::clients::ClientDirectory;
use crate::config::RunConfig;
use crate::graph::RelationshipGraph;
use crate::record::Transaction;
use thiserror::Error;

/// Sub-scores are bounded to this value before weighting.
pub const PROFILE_SCORE_CAP: f64 = 10.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("no history for client '{client_id}'")]
    MissingHistory { client_id: String },

    #[error("history too shallow for client '{client_id}' ({observed} < {required})")]
    InsufficientHistory {
        client_id: String,
        observed: u64,
        required: u64,
    },
}

/// One evaluator's verdict: a score in [0, 10] and the rule identifiers
/// that fired, in the order the rules were checked.
#[derive(Debug, Clone, Default)]
pub struct ProfileScore {
    pub score: f64,
    pub indicators: Vec<String>,
}

impl ProfileScore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule contribution and record its indicator.
    pub fn hit(&mut self, points: f64, indicator: &str) {
        self.score += points;
        self.indicators.push(indicator.to_string());
    }

    pub fn capped(mut self) -> Self {
        self.score = self.score.clamp(0.0, PROFILE_SCORE_CAP);
        self
    }
}

/// Read-only view of run state handed to every evaluator.
pub struct EvalContext<'a> {
    pub config: &'a RunConfig,
    pub clients: &'a ClientDirectory,
    pub graph: &'a RelationshipGraph,
}

pub trait RiskProfile: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, tx: &Transaction, ctx: &EvalContext<'_>)
        -> Result<ProfileScore, ProfileError>;
}

/// The standard evaluator set, in weighting order.
pub fn standard_profiles() -> Vec<Box<dyn RiskProfile>> {
    vec![
        Box::new(TransactionalProfile),
        Box::new(NetworkProfile),
        Box::new(CustomerProfile),
        Box::new(BehavioralProfile),
        Box::new(GeographicProfile),
    ]
}
