//! Record normalization: raw exporter records to canonical Transactions.
//!
//! The export format accumulated several generations of field names for the
//! same semantic field. Each canonical field resolves through an ordered
//! alias table; numeric and date fields parse strictly and fail closed with
//! a SchemaError rather than defaulting. Pure: no I/O, no shared state.

use crate::error::SchemaError;
use crate::record::{Channel, Party, Transaction};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Top-level key the exporter wraps each payload under. Bare objects are
/// also accepted; some historical files skipped the wrapper.
const WRAPPER_KEY: &str = "row_to_json";

// ── Alias tables ─────────────────────────────────────────────────────────────

const REFERENCE_ALIASES: &[&str] = &["reference_id", "transaction_id", "gmess_id"];
const TIMESTAMP_ALIASES: &[&str] = &["date", "transaction_date", "goper_trans_date"];
const AMOUNT_ALIASES: &[&str] = &["amount", "amount_base", "goper_tenge_amount"];
const PURPOSE_ALIASES: &[&str] = &["purpose", "purpose_text", "goper_dopinfo"];
const CHANNEL_ALIASES: &[&str] = &["channel", "operation_type", "goper_oper_type"];

const SENDER_ID_ALIASES: &[&str] = &["sender_id", "gmember_maincode_pl1", "gmember1_maincode"];
const SENDER_NAME_ALIASES: &[&str] = &["sender_name", "gmember_name_pl1", "gmember1_ur_name"];
const SENDER_COUNTRY_ALIASES: &[&str] = &["sender_country", "gmember_residence_pl1"];
const SENDER_ACCOUNT_ALIASES: &[&str] = &["sender_account", "debtor_account", "gmember1_bank_account"];
const SENDER_BANK_ALIASES: &[&str] = &["sender_bank_code", "gmember1_bank_bik"];

const RECEIVER_ID_ALIASES: &[&str] = &["beneficiary_id", "gmember_maincode_pol1", "gmember2_maincode"];
const RECEIVER_NAME_ALIASES: &[&str] = &["beneficiary_name", "gmember_name_pol1", "gmember2_ur_name"];
const RECEIVER_COUNTRY_ALIASES: &[&str] = &["beneficiary_country", "gmember_residence_pol1"];
const RECEIVER_ACCOUNT_ALIASES: &[&str] = &["beneficiary_account", "creditor_account", "gmember2_bank_account"];
const RECEIVER_BANK_ALIASES: &[&str] = &["beneficiary_bank_code", "gmember2_bank_bik"];

/// Person-name fragments of the oldest export generation, joined in order
/// when no single-field name is present.
const SENDER_NAME_PARTS: &[&str] =
    &["gmember1_ac_secondname", "gmember1_ac_firstname", "gmember1_ac_middlename"];
const RECEIVER_NAME_PARTS: &[&str] =
    &["gmember2_ac_secondname", "gmember2_ac_firstname", "gmember2_ac_middlename"];

/// Country assumed when the exporter omitted a residence code. The export
/// is a domestic regulatory feed, so absence means the home jurisdiction.
const DEFAULT_COUNTRY: &str = "KZ";

// ── Resolution helpers ───────────────────────────────────────────────────────

fn resolve<'a>(record: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|key| {
        let v = record.get(key)?;
        if v.is_null() {
            None
        } else {
            Some(v)
        }
    })
}

fn resolve_string(record: &Value, aliases: &'static [&'static str]) -> Option<String> {
    let value = resolve(record, aliases)?;
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        // Some exporters emit numeric identifiers.
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn require_string(
    record: &Value,
    aliases: &'static [&'static str],
    field: &'static str,
) -> Result<String, SchemaError> {
    resolve_string(record, aliases).ok_or(SchemaError::MissingField { field })
}

fn parse_amount(record: &Value) -> Result<f64, SchemaError> {
    let value = resolve(record, AMOUNT_ALIASES).ok_or(SchemaError::MissingField { field: "amount" })?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(a) if a.is_finite() && a >= 0.0 => Ok(a),
        _ => Err(SchemaError::InvalidValue { field: "amount", value: value.to_string() }),
    }
}

fn parse_timestamp(record: &Value) -> Result<DateTime<Utc>, SchemaError> {
    let value =
        resolve(record, TIMESTAMP_ALIASES).ok_or(SchemaError::MissingField { field: "timestamp" })?;
    let text = value
        .as_str()
        .ok_or_else(|| SchemaError::InvalidValue { field: "timestamp", value: value.to_string() })?;
    // Strict ISO-8601; fractional seconds tolerated, nothing else.
    let trimmed = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|_| SchemaError::InvalidValue { field: "timestamp", value: trimmed.to_string() })?;
    Ok(naive.and_utc())
}

fn joined_name_parts(record: &Value, parts: &[&str]) -> Option<String> {
    let joined: Vec<String> = parts
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined.join(" "))
    }
}

fn parse_party(
    record: &Value,
    id_aliases: &'static [&'static str],
    name_aliases: &'static [&'static str],
    name_parts: &'static [&'static str],
    country_aliases: &'static [&'static str],
    account_aliases: &'static [&'static str],
    bank_aliases: &'static [&'static str],
    id_field: &'static str,
) -> Result<Party, SchemaError> {
    let id = require_string(record, id_aliases, id_field)?;
    let name = resolve_string(record, name_aliases)
        .or_else(|| joined_name_parts(record, name_parts))
        .unwrap_or_default();
    let country = resolve_string(record, country_aliases)
        .map(|c| c.to_uppercase())
        .unwrap_or_else(|| DEFAULT_COUNTRY.to_string());
    Ok(Party {
        id,
        name,
        account: resolve_string(record, account_aliases),
        bank_code: resolve_string(record, bank_aliases),
        country,
    })
}

fn parse_channel(record: &Value, sender: &Party, receiver: &Party) -> Channel {
    if let Some(raw) = resolve_string(record, CHANNEL_ALIASES) {
        let lowered = raw.to_lowercase();
        if lowered.contains("cash") {
            return Channel::Cash;
        }
        if lowered.contains("card") {
            return Channel::Card;
        }
        if lowered.contains("international") {
            return Channel::International;
        }
        if lowered.contains("domestic") || lowered.contains("transfer") {
            return Channel::Domestic;
        }
        // Legacy numeric operation codes: 11xx/12xx cash, 23xx international,
        // 21xx/22xx domestic transfer, 41xx card.
        if let Some(prefix) = lowered.get(0..2) {
            match prefix {
                "11" | "12" => return Channel::Cash,
                "23" => return Channel::International,
                "21" | "22" => return Channel::Domestic,
                "41" => return Channel::Card,
                _ => {}
            }
        }
        return Channel::Other;
    }
    // No channel field at all: infer from the route.
    if sender.country != receiver.country {
        Channel::International
    } else {
        Channel::Domestic
    }
}

/// Normalize one raw record into the canonical Transaction shape.
pub fn normalize(raw: &Value) -> Result<Transaction, SchemaError> {
    let record = raw.get(WRAPPER_KEY).unwrap_or(raw);
    if !record.is_object() {
        return Err(SchemaError::NotAnObject);
    }

    let reference_id = require_string(record, REFERENCE_ALIASES, "reference_id")?;
    let timestamp = parse_timestamp(record)?;
    let amount = parse_amount(record)?;
    let sender = parse_party(
        record,
        SENDER_ID_ALIASES,
        SENDER_NAME_ALIASES,
        SENDER_NAME_PARTS,
        SENDER_COUNTRY_ALIASES,
        SENDER_ACCOUNT_ALIASES,
        SENDER_BANK_ALIASES,
        "sender_id",
    )?;
    let receiver = parse_party(
        record,
        RECEIVER_ID_ALIASES,
        RECEIVER_NAME_ALIASES,
        RECEIVER_NAME_PARTS,
        RECEIVER_COUNTRY_ALIASES,
        RECEIVER_ACCOUNT_ALIASES,
        RECEIVER_BANK_ALIASES,
        "beneficiary_id",
    )?;
    let purpose_text = resolve_string(record, PURPOSE_ALIASES).unwrap_or_default();
    let channel = parse_channel(record, &sender, &receiver);

    Ok(Transaction {
        reference_id,
        timestamp,
        amount,
        sender,
        receiver,
        purpose_text,
        channel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn modern_record() -> Value {
        json!({
            "transaction_id": "TX-1001",
            "date": "2025-04-21T10:30:00",
            "amount": 1_500_000.0,
            "channel": "domestic_transfer",
            "sender_id": "C-100",
            "sender_name": "Alpha Trading LLP",
            "sender_country": "KZ",
            "sender_account": "KZ86125KZT5004100100",
            "beneficiary_id": "C-200",
            "beneficiary_name": "Beta Supplies LLP",
            "beneficiary_country": "KZ",
            "purpose": "payment for services under contract 44-B"
        })
    }

    #[test]
    fn modern_field_names_normalize() {
        let tx = normalize(&modern_record()).unwrap();
        assert_eq!(tx.reference_id, "TX-1001");
        assert_eq!(tx.amount, 1_500_000.0);
        assert_eq!(tx.sender.id, "C-100");
        assert_eq!(tx.receiver.country, "KZ");
        assert_eq!(tx.channel, Channel::Domestic);
        assert!(!tx.is_cross_border());
    }

    #[test]
    fn legacy_field_names_normalize_to_same_shape() {
        let raw = json!({
            "row_to_json": {
                "gmess_id": 99881,
                "goper_trans_date": "2025-04-21T21:00:00.123",
                "goper_tenge_amount": "2500000",
                "goper_oper_type": "1100",
                "gmember1_maincode": "C-100",
                "gmember1_ac_secondname": "Ivanov",
                "gmember1_ac_firstname": "Ivan",
                "gmember_residence_pl1": "kz",
                "gmember2_maincode": "C-200",
                "gmember_name_pol1": "Beta Supplies LLP",
                "goper_dopinfo": "refund"
            }
        });
        let tx = normalize(&raw).unwrap();
        assert_eq!(tx.reference_id, "99881");
        assert_eq!(tx.amount, 2_500_000.0);
        assert_eq!(tx.sender.name, "Ivanov Ivan");
        assert_eq!(tx.sender.country, "KZ");
        assert_eq!(tx.channel, Channel::Cash);
    }

    #[test]
    fn missing_amount_fails_closed() {
        let mut raw = modern_record();
        raw.as_object_mut().unwrap().remove("amount");
        let err = normalize(&raw).unwrap_err();
        assert_eq!(err, SchemaError::MissingField { field: "amount" });
    }

    #[test]
    fn unparseable_amount_is_invalid_not_defaulted() {
        let mut raw = modern_record();
        raw["amount"] = json!("2,5 mln");
        assert!(matches!(
            normalize(&raw).unwrap_err(),
            SchemaError::InvalidValue { field: "amount", .. }
        ));
    }

    #[test]
    fn negative_amount_rejected() {
        let mut raw = modern_record();
        raw["amount"] = json!(-10.0);
        assert!(matches!(
            normalize(&raw).unwrap_err(),
            SchemaError::InvalidValue { field: "amount", .. }
        ));
    }

    #[test]
    fn bad_timestamp_rejected() {
        let mut raw = modern_record();
        raw["date"] = json!("21/04/2025");
        assert!(matches!(
            normalize(&raw).unwrap_err(),
            SchemaError::InvalidValue { field: "timestamp", .. }
        ));
    }

    #[test]
    fn missing_party_id_rejected() {
        let mut raw = modern_record();
        raw.as_object_mut().unwrap().remove("sender_id");
        assert_eq!(
            normalize(&raw).unwrap_err(),
            SchemaError::MissingField { field: "sender_id" }
        );
    }

    #[test]
    fn channel_inferred_from_route_when_absent() {
        let mut raw = modern_record();
        raw.as_object_mut().unwrap().remove("channel");
        raw["beneficiary_country"] = json!("DE");
        let tx = normalize(&raw).unwrap();
        assert_eq!(tx.channel, Channel::International);
    }
}
