//! Behavioral profile: deviation from the client's own baseline.
//!
//! Compares the transaction against the sender's running amount statistics
//! (Welford mean and deviation), habitual hours, and activity gaps. Needs a
//! minimum history depth before any of those comparisons mean anything.

use crate::record::{is_night_hour, Transaction};
use chrono::Timelike;

use super::{EvalContext, ProfileError, ProfileScore, RiskProfile};

/// Transactions a client must have before baselines are trusted.
const MIN_HISTORY: u64 = 5;
const STRONG_DEVIATION_Z: f64 = 3.0;
const STRONG_DEVIATION_POINTS: f64 = 4.0;
const MILD_DEVIATION_Z: f64 = 2.0;
const MILD_DEVIATION_POINTS: f64 = 2.0;
const HABITUAL_NIGHT_RATIO: f64 = 0.1;
const UNUSUAL_HOUR_POINTS: f64 = 2.0;
const DORMANT_DAYS: i64 = 90;
const DORMANT_POINTS: f64 = 3.0;

pub struct BehavioralProfile;

impl RiskProfile for BehavioralProfile {
    fn name(&self) -> &'static str {
        "behavioral"
    }

    fn evaluate(
        &self,
        tx: &Transaction,
        ctx: &EvalContext<'_>,
    ) -> Result<ProfileScore, ProfileError> {
        let history = ctx.clients.get(&tx.sender.id).ok_or(ProfileError::MissingHistory {
            client_id: tx.sender.id.clone(),
        })?;
        if history.total_transactions < MIN_HISTORY {
            return Err(ProfileError::InsufficientHistory {
                client_id: tx.sender.id.clone(),
                observed: history.total_transactions,
                required: MIN_HISTORY,
            });
        }

        let mut out = ProfileScore::new();

        if let Some(stddev) = history.amount_stddev() {
            if stddev > 0.0 {
                let z = (tx.amount - history.amount_mean) / stddev;
                if z >= STRONG_DEVIATION_Z {
                    out.hit(STRONG_DEVIATION_POINTS, "amount_deviation");
                } else if z >= MILD_DEVIATION_Z {
                    out.hit(MILD_DEVIATION_POINTS, "amount_deviation");
                }
            }
        }

        let night_ratio = history.night_transactions as f64 / history.total_transactions as f64;
        if is_night_hour(tx.timestamp.hour()) && night_ratio < HABITUAL_NIGHT_RATIO {
            out.hit(UNUSUAL_HOUR_POINTS, "unusual_hour_for_client");
        }

        let gap_days = (tx.timestamp - history.last_seen).num_days();
        if gap_days >= DORMANT_DAYS {
            out.hit(DORMANT_POINTS, "dormant_reactivation");
        }

        Ok(out.capped())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientDirectory;
    use crate::config::RunConfig;
    use crate::graph::RelationshipGraph;
    use crate::record::{Channel, Party};
    use chrono::{DateTime, TimeZone, Utc};

    fn tx(amount: f64, at: DateTime<Utc>) -> Transaction {
        let party = |id: &str| Party {
            id: id.to_string(),
            name: String::new(),
            account: None,
            bank_code: None,
            country: "KZ".to_string(),
        };
        Transaction {
            reference_id: "r1".to_string(),
            timestamp: at,
            amount,
            sender: party("c1"),
            receiver: party("recv"),
            purpose_text: "invoice".to_string(),
            channel: Channel::Domestic,
        }
    }

    fn seeded_directory(n: u64, base: DateTime<Utc>) -> ClientDirectory {
        let clients = ClientDirectory::new();
        for i in 0..n {
            // Small spread around 100k, all daytime.
            clients.absorb("c1", "", "KZ", 100_000.0 + (i % 3) as f64 * 5_000.0, base, false, false);
        }
        clients
    }

    #[test]
    fn shallow_history_is_an_error() {
        let config = RunConfig::default();
        let base = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let clients = seeded_directory(3, base);
        let graph = RelationshipGraph::new(config.strength);
        let ctx = EvalContext { config: &config, clients: &clients, graph: &graph };
        let err = BehavioralProfile.evaluate(&tx(100_000.0, base), &ctx).unwrap_err();
        assert!(matches!(err, ProfileError::InsufficientHistory { observed: 3, .. }));
    }

    #[test]
    fn large_outlier_amount_flags_deviation() {
        let config = RunConfig::default();
        let base = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let clients = seeded_directory(20, base);
        let graph = RelationshipGraph::new(config.strength);
        let ctx = EvalContext { config: &config, clients: &clients, graph: &graph };
        let out = BehavioralProfile.evaluate(&tx(5_000_000.0, base), &ctx).unwrap();
        assert!(out.indicators.iter().any(|i| i == "amount_deviation"));
    }

    #[test]
    fn night_transaction_for_daytime_client_flags() {
        let config = RunConfig::default();
        let base = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let clients = seeded_directory(20, base);
        let graph = RelationshipGraph::new(config.strength);
        let ctx = EvalContext { config: &config, clients: &clients, graph: &graph };
        let night = Utc.with_ymd_and_hms(2025, 1, 11, 3, 0, 0).unwrap();
        let out = BehavioralProfile.evaluate(&tx(100_000.0, night), &ctx).unwrap();
        assert!(out.indicators.iter().any(|i| i == "unusual_hour_for_client"));
    }

    #[test]
    fn long_gap_flags_dormant_reactivation() {
        let config = RunConfig::default();
        let base = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();
        let clients = seeded_directory(20, base);
        let graph = RelationshipGraph::new(config.strength);
        let ctx = EvalContext { config: &config, clients: &clients, graph: &graph };
        let later = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let out = BehavioralProfile.evaluate(&tx(100_000.0, later), &ctx).unwrap();
        assert!(out.indicators.iter().any(|i| i == "dormant_reactivation"));
    }
}
