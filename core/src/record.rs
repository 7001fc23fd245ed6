//! Canonical data model: the typed shapes every other module works with.
//!
//! Raw exporter records (with their legacy field-name variants) only exist
//! inside the normalizer. Everything downstream sees these types.

use crate::types::{ClientId, ReferenceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation channel, derived from the exporter's channel / operation-code
/// field. Drives which amount threshold applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Cash,
    Domestic,
    International,
    Card,
    Other,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Cash => "cash",
            Channel::Domestic => "domestic",
            Channel::International => "international",
            Channel::Card => "card",
            Channel::Other => "other",
        }
    }
}

/// One side of a transaction (sender or receiver identity block).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    pub id: ClientId,
    pub name: String,
    pub account: Option<String>,
    pub bank_code: Option<String>,
    /// ISO 3166-1 alpha-2, upper case.
    pub country: String,
}

/// The canonical transaction value produced by the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub reference_id: ReferenceId,
    pub timestamp: DateTime<Utc>,
    /// Amount in the base currency, already converted by the exporter.
    pub amount: f64,
    pub sender: Party,
    pub receiver: Party,
    pub purpose_text: String,
    pub channel: Channel,
}

impl Transaction {
    pub fn is_cross_border(&self) -> bool {
        self.sender.country != self.receiver.country
    }
}

/// Discrete risk classification of a final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

/// The five sub-scores, each in [0, 10].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProfileScores {
    pub transactional: f64,
    pub network: f64,
    pub customer: f64,
    pub behavioral: f64,
    pub geographic: f64,
}

/// Final per-transaction verdict. Created exactly once per transaction per
/// run and immutable once persisted; corrections are a new version, never
/// a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub reference_id: ReferenceId,
    pub sender_id: ClientId,
    pub receiver_id: ClientId,
    pub timestamp: DateTime<Utc>,
    pub amount: f64,
    pub scores: ProfileScores,
    pub final_score: f64,
    pub risk_level: RiskLevel,
    /// Triggered rule identifiers, in evaluator order.
    pub indicators: Vec<String>,
}

/// Running aggregates for one client. Written only by the persistence
/// sink after a transaction's final score is known; evaluators get a
/// read-only copy through the evaluation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAggregates {
    pub client_id: ClientId,
    pub display_name: String,
    pub country: String,
    pub total_transactions: u64,
    pub total_amount: f64,
    pub suspicious_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Welford running mean of amounts.
    pub amount_mean: f64,
    /// Welford running sum of squared deviations.
    pub amount_m2: f64,
    /// Transactions observed between 23:00 and 06:00.
    pub night_transactions: u64,
}

impl ClientAggregates {
    pub fn new(client_id: ClientId, display_name: String, country: String, seen: DateTime<Utc>) -> Self {
        Self {
            client_id,
            display_name,
            country,
            total_transactions: 0,
            total_amount: 0.0,
            suspicious_count: 0,
            first_seen: seen,
            last_seen: seen,
            amount_mean: 0.0,
            amount_m2: 0.0,
            night_transactions: 0,
        }
    }

    /// Fold one scored transaction into the running aggregates.
    pub fn absorb(&mut self, amount: f64, at: DateTime<Utc>, suspicious: bool, night: bool) {
        self.total_transactions += 1;
        self.total_amount += amount;
        if suspicious {
            self.suspicious_count += 1;
        }
        if night {
            self.night_transactions += 1;
        }
        if at < self.first_seen {
            self.first_seen = at;
        }
        if at > self.last_seen {
            self.last_seen = at;
        }
        // Welford update
        let n = self.total_transactions as f64;
        let delta = amount - self.amount_mean;
        self.amount_mean += delta / n;
        self.amount_m2 += delta * (amount - self.amount_mean);
    }

    /// Sample standard deviation of amounts; None below two observations.
    pub fn amount_stddev(&self) -> Option<f64> {
        if self.total_transactions < 2 {
            return None;
        }
        Some((self.amount_m2 / (self.total_transactions as f64 - 1.0)).sqrt())
    }

    pub fn suspicious_ratio(&self) -> f64 {
        if self.total_transactions == 0 {
            0.0
        } else {
            self.suspicious_count as f64 / self.total_transactions as f64
        }
    }
}

/// Hours treated as night for behavioral baselines and the unusual-time
/// indicator (before 06:00 or after 23:00).
pub fn is_night_hour(hour: u32) -> bool {
    !(6..=23).contains(&hour)
}
