//! End-to-end scoring behavior: threshold indicators, classification, and
//! relationship buildup, run through the full pipeline against a file store.

use aml_core::metrics::LogMetricsSink;
use aml_core::record::RiskLevel;
use aml_core::scheduler::{run, CancelToken};
use aml_core::store::AmlStore;
use aml_core::RunConfig;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

fn write_export(dir: &Path, name: &str, records: Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string(&records).unwrap()).unwrap();
    path
}

fn record(reference: &str, amount: f64, channel: &str, sender: &str, receiver: &str) -> Value {
    json!({
        "reference_id": reference,
        "date": "2025-04-21T12:00:00Z",
        "amount": amount,
        "channel": channel,
        "sender_id": sender,
        "sender_name": format!("Client {sender}"),
        "sender_country": "KZ",
        "beneficiary_id": receiver,
        "beneficiary_name": format!("Client {receiver}"),
        "beneficiary_country": "KZ",
        "purpose": "invoice 2025-114 for equipment"
    })
}

fn single_worker_config() -> RunConfig {
    let mut config = RunConfig::default();
    config.max_workers = 1;
    config.batch_size = 100;
    config
}

/// A domestic transfer over the domestic threshold must carry the threshold
/// indicator and a non-zero transactional sub-score.
#[test]
fn domestic_threshold_breach_is_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(
        dir.path(),
        "export.json",
        json!([record("TX-A", 7_500_000.0, "domestic", "c1", "c2")]),
    );
    let db = dir.path().join("aml.db");

    let store = AmlStore::open(db.to_str().unwrap()).unwrap();
    let summary = run(single_worker_config(), store, &[input], CancelToken::new(), &LogMetricsSink)
        .unwrap();
    assert!(summary.all_completed());

    let store = AmlStore::open(db.to_str().unwrap()).unwrap();
    let assessment = store.assessment_by_reference("TX-A").unwrap().unwrap();
    assert!(
        assessment
            .indicators
            .iter()
            .any(|i| i == "domestic_transfer_threshold_exceeded"),
        "indicators: {:?}",
        assessment.indicators
    );
    assert!(assessment.scores.transactional > 0.0);
}

/// A cash operation over the cash threshold classifies at least medium
/// under the default weights and cuts.
#[test]
fn cash_threshold_breach_is_at_least_medium() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_export(
        dir.path(),
        "export.json",
        json!([record("TX-B", 2_500_000.0, "cash", "c1", "c2")]),
    );
    let db = dir.path().join("aml.db");

    let store = AmlStore::open(db.to_str().unwrap()).unwrap();
    run(single_worker_config(), store, &[input], CancelToken::new(), &LogMetricsSink).unwrap();

    let store = AmlStore::open(db.to_str().unwrap()).unwrap();
    let assessment = store.assessment_by_reference("TX-B").unwrap().unwrap();
    assert!(
        assessment.risk_level >= RiskLevel::Medium,
        "final score {} classified {:?}",
        assessment.final_score,
        assessment.risk_level
    );
    assert!(
        assessment
            .indicators
            .iter()
            .any(|i| i == "cash_operation_threshold_exceeded"),
        "indicators: {:?}",
        assessment.indicators
    );
}

/// Fifty transactions between the same pair saturate the connection
/// strength, and a later transaction between them gets a higher network
/// sub-score than a first-time pair in the same batch.
#[test]
fn repeated_pair_builds_relationship_strength() {
    let dir = tempfile::tempdir().unwrap();
    let mut records: Vec<Value> = (0..50)
        .map(|i| record(&format!("TX-C{i:02}"), 5_000_000.0, "domestic", "a", "b"))
        .collect();
    records.push(record("TX-LATE", 100_000.0, "domestic", "a", "b"));
    records.push(record("TX-FRESH", 100_000.0, "domestic", "x", "y"));
    let input = write_export(dir.path(), "export.json", json!(records));
    let db = dir.path().join("aml.db");

    let store = AmlStore::open(db.to_str().unwrap()).unwrap();
    let summary = run(single_worker_config(), store, &[input], CancelToken::new(), &LogMetricsSink)
        .unwrap();
    assert_eq!(summary.records_ingested, 52);

    let store = AmlStore::open(db.to_str().unwrap()).unwrap();
    let edge = store.get_edge("a", "b").unwrap().unwrap();
    assert_eq!(edge.transaction_count, 51);
    assert!(edge.connection_strength > 9.5, "strength {}", edge.connection_strength);

    let late = store.assessment_by_reference("TX-LATE").unwrap().unwrap();
    let fresh = store.assessment_by_reference("TX-FRESH").unwrap().unwrap();
    assert!(
        late.scores.network > fresh.scores.network,
        "established pair {} vs first-time {}",
        late.scores.network,
        fresh.scores.network
    );
}

/// Everything persisted stays inside the documented score bounds.
#[test]
fn scores_stay_in_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let records: Vec<Value> = (0..20)
        .map(|i| {
            record(
                &format!("TX-S{i:02}"),
                10_000_000.0 + i as f64 * 1_000_000.0,
                if i % 2 == 0 { "cash" } else { "international" },
                "big",
                &format!("peer{i}"),
            )
        })
        .collect();
    let input = write_export(dir.path(), "export.json", json!(records));
    let db = dir.path().join("aml.db");

    let store = AmlStore::open(db.to_str().unwrap()).unwrap();
    run(single_worker_config(), store, &[input], CancelToken::new(), &LogMetricsSink).unwrap();

    let store = AmlStore::open(db.to_str().unwrap()).unwrap();
    for i in 0..20 {
        let a = store
            .assessment_by_reference(&format!("TX-S{i:02}"))
            .unwrap()
            .unwrap();
        assert!((0.0..=10.0).contains(&a.final_score));
        for sub in [
            a.scores.transactional,
            a.scores.network,
            a.scores.customer,
            a.scores.behavioral,
            a.scores.geographic,
        ] {
            assert!((0.0..=10.0).contains(&sub), "sub-score {sub} out of range");
        }
    }
}
