//! Score aggregation: five sub-scores become one verdict.
//!
//! Runs after the network evaluation (and therefore after the graph updates
//! of the batch's earlier transactions). Evaluator failures are absorbed
//! here as a neutral 0.0 plus the `evaluation_incomplete` indicator, so a
//! thin client history can never fail a batch.

use crate::config::{ProfileWeights, RiskCuts};
use crate::profiles::{ProfileError, ProfileScore};
use crate::record::{ProfileScores, RiskAssessment, RiskLevel, Transaction};

pub const FINAL_SCORE_CAP: f64 = 10.0;

fn weight_of(profile: &str, weights: &ProfileWeights) -> f64 {
    match profile {
        "transactional" => weights.transaction,
        "network" => weights.network,
        "customer" => weights.customer,
        "behavioral" => weights.behavioral,
        "geographic" => weights.geographic,
        _ => 0.0,
    }
}

fn level_of(score: f64, cuts: &RiskCuts) -> RiskLevel {
    if score >= cuts.high {
        RiskLevel::High
    } else if score >= cuts.medium {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Combine evaluator outcomes (in evaluator order) into the final
/// assessment for one transaction.
pub fn aggregate(
    tx: &Transaction,
    outcomes: &[(&'static str, Result<ProfileScore, ProfileError>)],
    weights: &ProfileWeights,
    cuts: &RiskCuts,
) -> RiskAssessment {
    let mut scores = ProfileScores::default();
    let mut indicators: Vec<String> = Vec::new();
    let mut final_score = 0.0;

    for (name, outcome) in outcomes {
        let sub = match outcome {
            Ok(sub) => {
                indicators.extend(sub.indicators.iter().cloned());
                sub.score
            }
            Err(_) => {
                indicators.push("evaluation_incomplete".to_string());
                0.0
            }
        };
        match *name {
            "transactional" => scores.transactional = sub,
            "network" => scores.network = sub,
            "customer" => scores.customer = sub,
            "behavioral" => scores.behavioral = sub,
            "geographic" => scores.geographic = sub,
            _ => {}
        }
        final_score += weight_of(name, weights) * sub;
    }

    let final_score = final_score.clamp(0.0, FINAL_SCORE_CAP);
    RiskAssessment {
        reference_id: tx.reference_id.clone(),
        sender_id: tx.sender.id.clone(),
        receiver_id: tx.receiver.id.clone(),
        timestamp: tx.timestamp,
        amount: tx.amount,
        scores,
        final_score,
        risk_level: level_of(final_score, cuts),
        indicators,
    }
}
