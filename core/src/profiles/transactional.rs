//! Transactional profile: single-transaction red flags.
//!
//! Rule set and point values follow the regulator's threshold methodology:
//! category amount thresholds, near-threshold structuring, round amounts,
//! night-hour timing, and purpose-text heuristics.

use crate::config::Thresholds;
use crate::record::{is_night_hour, Channel, Transaction};
use chrono::Timelike;

use super::{EvalContext, ProfileError, ProfileScore, RiskProfile};

const THRESHOLD_POINTS: f64 = 3.0;
const RATIO_BONUS_CAP: f64 = 2.0;
const STRUCTURING_POINTS: f64 = 1.5;
const STRUCTURING_BAND: f64 = 0.10;
const ROUND_AMOUNT_POINTS: f64 = 2.0;
const ROUND_AMOUNT_FLOOR: f64 = 100_000.0;
const UNUSUAL_TIME_POINTS: f64 = 1.5;
const SUSPICIOUS_PURPOSE_POINTS: f64 = 1.5;
const UNINFORMATIVE_PURPOSE_POINTS: f64 = 1.0;

/// Purpose phrases that historically correlate with layering schemes.
const SUSPICIOUS_PURPOSE_TERMS: &[&str] = &[
    "loan",
    "debt return",
    "gift",
    "financial aid",
    "consulting services",
    "займ",
    "возврат долга",
    "дарение",
    "материальная помощь",
    "консультацион",
];

/// Purpose texts that say nothing about the operation.
const GENERIC_PURPOSE_TERMS: &[&str] = &["payment", "transfer", "оплата", "перевод", "платеж"];

pub struct TransactionalProfile;

fn category(channel: Channel, thresholds: &Thresholds) -> (f64, &'static str) {
    match channel {
        Channel::Cash => (thresholds.cash_operations, "cash_operation_threshold_exceeded"),
        Channel::International => (
            thresholds.international_transfers,
            "international_transfer_threshold_exceeded",
        ),
        // Card and uncategorized operations fall under the domestic threshold.
        Channel::Domestic | Channel::Card | Channel::Other => (
            thresholds.domestic_transfers,
            "domestic_transfer_threshold_exceeded",
        ),
    }
}

fn is_round_amount(amount: f64) -> bool {
    amount >= ROUND_AMOUNT_FLOOR && amount % 1_000.0 == 0.0
}

impl RiskProfile for TransactionalProfile {
    fn name(&self) -> &'static str {
        "transactional"
    }

    fn evaluate(
        &self,
        tx: &Transaction,
        ctx: &EvalContext<'_>,
    ) -> Result<ProfileScore, ProfileError> {
        let mut out = ProfileScore::new();
        let (threshold, indicator) = category(tx.channel, &ctx.config.thresholds);

        if tx.amount > threshold {
            out.hit(THRESHOLD_POINTS, indicator);
            // The further over the threshold, the worse. Saturates so a
            // single giant amount does not dominate every other signal.
            let ratio_bonus = ((tx.amount / threshold - 1.0) * 2.0).min(RATIO_BONUS_CAP);
            out.score += ratio_bonus;
        } else if tx.amount >= threshold * (1.0 - STRUCTURING_BAND) {
            // Amounts kept just under the reporting line.
            out.hit(STRUCTURING_POINTS, "structuring_pattern");
        }

        if is_round_amount(tx.amount) {
            out.hit(ROUND_AMOUNT_POINTS, "round_amount");
        }

        if is_night_hour(tx.timestamp.hour()) {
            out.hit(UNUSUAL_TIME_POINTS, "unusual_time");
        }

        let purpose = tx.purpose_text.trim().to_lowercase();
        if SUSPICIOUS_PURPOSE_TERMS.iter().any(|t| purpose.contains(t)) {
            out.hit(SUSPICIOUS_PURPOSE_POINTS, "suspicious_purpose");
        } else if purpose.len() < 5 || GENERIC_PURPOSE_TERMS.contains(&purpose.as_str()) {
            out.hit(UNINFORMATIVE_PURPOSE_POINTS, "uninformative_purpose");
        }

        Ok(out.capped())
    }
}
