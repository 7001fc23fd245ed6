//! Geographic profile: jurisdiction risk of both parties.

use crate::record::Transaction;

use super::{EvalContext, ProfileError, ProfileScore, RiskProfile};

const SENDER_WEIGHT: f64 = 0.3;
const RECEIVER_WEIGHT: f64 = 0.4;
const HIGH_RISK_COUNTRY: f64 = 8.0;
const CROSS_BORDER_POINTS: f64 = 2.0;

pub struct GeographicProfile;

impl RiskProfile for GeographicProfile {
    fn name(&self) -> &'static str {
        "geographic"
    }

    fn evaluate(
        &self,
        tx: &Transaction,
        ctx: &EvalContext<'_>,
    ) -> Result<ProfileScore, ProfileError> {
        let risk = &ctx.config.country_risk;
        let sender_score = risk.country_score(&tx.sender.country);
        let receiver_score = risk.country_score(&tx.receiver.country);

        let mut out = ProfileScore::new();
        out.score = SENDER_WEIGHT * sender_score + RECEIVER_WEIGHT * receiver_score;

        // One indicator per risk class, even when both parties fall in it.
        for country in [&tx.sender.country, &tx.receiver.country] {
            let class = if risk.fatf_blacklist.contains(country.as_str()) {
                Some("fatf_blacklist_country")
            } else if risk.sanctioned.contains(country.as_str()) {
                Some("sanctioned_country")
            } else if risk.offshore_zones.contains(country.as_str()) {
                Some("offshore_zone")
            } else {
                None
            };
            if let Some(class) = class {
                if !out.indicators.iter().any(|i| i == class) {
                    out.indicators.push(class.to_string());
                }
            }
        }

        if tx.is_cross_border() && sender_score.max(receiver_score) >= HIGH_RISK_COUNTRY {
            out.hit(CROSS_BORDER_POINTS, "cross_border_high_risk");
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

    fn tx(sender_country: &str, receiver_country: &str) -> Transaction {
        let party = |id: &str, country: &str| Party {
            id: id.to_string(),
            name: String::new(),
            account: None,
            bank_code: None,
            country: country.to_string(),
        };
        Transaction {
            reference_id: "r1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 4, 21, 12, 0, 0).unwrap(),
            amount: 100.0,
            sender: party("a", sender_country),
            receiver: party("b", receiver_country),
            purpose_text: "invoice".to_string(),
            channel: Channel::International,
        }
    }

    fn eval(tx: &Transaction) -> ProfileScore {
        let config = RunConfig::default();
        let clients = ClientDirectory::new();
        let graph = RelationshipGraph::new(config.strength);
        let ctx = EvalContext { config: &config, clients: &clients, graph: &graph };
        GeographicProfile.evaluate(tx, &ctx).unwrap()
    }

    #[test]
    fn domestic_pair_scores_low() {
        let out = eval(&tx("KZ", "KZ"));
        assert!((out.score - 0.7).abs() < 1e-9);
        assert!(out.indicators.is_empty());
    }

    #[test]
    fn blacklist_receiver_dominates() {
        let out = eval(&tx("KZ", "IR"));
        assert!(out.indicators.iter().any(|i| i == "fatf_blacklist_country"));
        assert!(out.indicators.iter().any(|i| i == "cross_border_high_risk"));
        // 0.3*1 + 0.4*10 + 2.0 cross-border bonus
        assert!((out.score - 6.3).abs() < 1e-9);
    }

    #[test]
    fn shared_risk_class_is_reported_once() {
        let out = eval(&tx("RU", "BY"));
        let hits = out.indicators.iter().filter(|i| *i == "sanctioned_country").count();
        assert_eq!(hits, 1, "indicators: {:?}", out.indicators);
    }

    #[test]
    fn offshore_flags_without_cross_border_bonus() {
        let out = eval(&tx("KZ", "KY"));
        assert!(out.indicators.iter().any(|i| i == "offshore_zone"));
        assert!(!out.indicators.iter().any(|i| i == "cross_border_high_risk"));
    }
}
