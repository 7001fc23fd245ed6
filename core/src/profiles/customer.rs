//! Customer profile: the sender's accumulated track record.

use crate::record::Transaction;

use super::{EvalContext, ProfileError, ProfileScore, RiskProfile};

const SUSPICIOUS_RATIO_WEIGHT: f64 = 6.0;
const ELEVATED_RATIO: f64 = 0.2;
const ELEVATED_RATIO_POINTS: f64 = 1.5;
const VOLUME_SCALE: f64 = 10_000_000.0;
const VOLUME_CAP: f64 = 3.0;
const HIGH_VOLUME: f64 = 100_000_000.0;
const HIGH_VOLUME_POINTS: f64 = 1.0;

pub struct CustomerProfile;

impl RiskProfile for CustomerProfile {
    fn name(&self) -> &'static str {
        "customer"
    }

    fn evaluate(
        &self,
        tx: &Transaction,
        ctx: &EvalContext<'_>,
    ) -> Result<ProfileScore, ProfileError> {
        let history = ctx.clients.get(&tx.sender.id).ok_or(ProfileError::MissingHistory {
            client_id: tx.sender.id.clone(),
        })?;

        let mut out = ProfileScore::new();

        let ratio = history.suspicious_ratio();
        out.score += SUSPICIOUS_RATIO_WEIGHT * ratio;
        if ratio >= ELEVATED_RATIO {
            out.hit(ELEVATED_RATIO_POINTS, "elevated_suspicious_history");
        }

        // Log-scaled lifetime volume, so a retail client and a corporate
        // treasury do not share a bucket.
        out.score += (VOLUME_CAP * (1.0 + history.total_amount / VOLUME_SCALE).ln() / 4.0)
            .min(VOLUME_CAP);
        if history.total_amount >= HIGH_VOLUME {
            out.hit(HIGH_VOLUME_POINTS, "high_volume_client");
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
    use chrono::{TimeZone, Utc};

    fn tx(from: &str) -> Transaction {
        let party = |id: &str| Party {
            id: id.to_string(),
            name: String::new(),
            account: None,
            bank_code: None,
            country: "KZ".to_string(),
        };
        Transaction {
            reference_id: "r1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 4, 21, 12, 0, 0).unwrap(),
            amount: 100.0,
            sender: party(from),
            receiver: party("recv"),
            purpose_text: "invoice".to_string(),
            channel: Channel::Domestic,
        }
    }

    #[test]
    fn unknown_client_is_missing_history() {
        let config = RunConfig::default();
        let clients = ClientDirectory::new();
        let graph = RelationshipGraph::new(config.strength);
        let ctx = EvalContext { config: &config, clients: &clients, graph: &graph };
        let err = CustomerProfile.evaluate(&tx("ghost"), &ctx).unwrap_err();
        assert_eq!(err, ProfileError::MissingHistory { client_id: "ghost".to_string() });
    }

    #[test]
    fn suspicious_history_raises_score() {
        let config = RunConfig::default();
        let clients = ClientDirectory::new();
        let graph = RelationshipGraph::new(config.strength);
        let ts = Utc.with_ymd_and_hms(2025, 4, 20, 12, 0, 0).unwrap();
        for i in 0..10 {
            clients.absorb("clean", "", "KZ", 1_000.0, ts, false, false);
            clients.absorb("dirty", "", "KZ", 1_000.0, ts, i % 2 == 0, false);
        }
        let ctx = EvalContext { config: &config, clients: &clients, graph: &graph };
        let clean = CustomerProfile.evaluate(&tx("clean"), &ctx).unwrap();
        let dirty = CustomerProfile.evaluate(&tx("dirty"), &ctx).unwrap();
        assert!(dirty.score > clean.score);
        assert!(dirty.indicators.iter().any(|i| i == "elevated_suspicious_history"));
    }
}
