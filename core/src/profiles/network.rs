//! Network profile: what the relationship graph says about this pair.
//!
//! Reads the current edge between sender and receiver plus both parties'
//! centrality proxies. Within a batch this sees the edges of all earlier
//! transactions of that batch; across in-flight batches visibility is
//! eventual.

use crate::record::Transaction;

use super::{EvalContext, ProfileError, ProfileScore, RiskProfile};

const STRENGTH_WEIGHT: f64 = 0.4;
const CENTRALITY_WEIGHT: f64 = 0.3;
const ESTABLISHED_STRENGTH: f64 = 7.0;
const SUSPICIOUS_EDGE_POINTS: f64 = 3.0;
const HIGH_CENTRALITY: f64 = 7.0;
const HIGH_CENTRALITY_POINTS: f64 = 2.0;
const DENSE_DEGREE: u64 = 20;
const DENSE_NETWORK_POINTS: f64 = 1.5;

pub struct NetworkProfile;

impl RiskProfile for NetworkProfile {
    fn name(&self) -> &'static str {
        "network"
    }

    fn evaluate(
        &self,
        tx: &Transaction,
        ctx: &EvalContext<'_>,
    ) -> Result<ProfileScore, ProfileError> {
        let mut out = ProfileScore::new();

        if let Some(edge) = ctx.graph.edge(&tx.sender.id, &tx.receiver.id) {
            out.score += STRENGTH_WEIGHT * edge.connection_strength;
            if edge.connection_strength >= ESTABLISHED_STRENGTH {
                out.indicators.push("established_relationship".to_string());
            }
            if edge.is_suspicious {
                out.hit(SUSPICIOUS_EDGE_POINTS, "suspicious_relationship");
            }
        }

        let sender = ctx.graph.node(&tx.sender.id);
        let receiver = ctx.graph.node(&tx.receiver.id);
        let centrality = sender
            .as_ref()
            .map(|n| n.centrality)
            .unwrap_or(0.0)
            .max(receiver.as_ref().map(|n| n.centrality).unwrap_or(0.0));
        out.score += CENTRALITY_WEIGHT * centrality;
        if centrality >= HIGH_CENTRALITY {
            out.hit(HIGH_CENTRALITY_POINTS, "high_centrality_counterparty");
        }

        let max_degree = sender
            .map(|n| n.degree)
            .unwrap_or(0)
            .max(receiver.map(|n| n.degree).unwrap_or(0));
        if max_degree >= DENSE_DEGREE {
            out.hit(DENSE_NETWORK_POINTS, "dense_counterparty_network");
        }

        Ok(out.capped())
    }
}
