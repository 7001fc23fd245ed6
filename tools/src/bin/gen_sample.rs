//! gen-sample: deterministic export-file generator for demos and testing.
//!
//! Usage:
//!   gen-sample --seed 7 --count 1000 --clients 40 --out export.json
//!
//! Emits a JSON array of exporter records. A slice of them uses the legacy
//! wrapped field layout so the normalizer's alias handling gets exercised
//! on realistic input, and a small share carries deliberate red flags
//! (over-threshold amounts, night timestamps, offshore counterparties).

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde_json::{json, Value};
use std::env;

const COUNTRIES: &[&str] = &["KZ", "KZ", "KZ", "KZ", "RU", "DE", "TR", "KY", "AE", "CN"];
const PURPOSES: &[&str] = &[
    "invoice 2025-114 for equipment",
    "salary for april",
    "rent payment office 4b",
    "payment",
    "consulting services",
    "перевод",
];

fn main() -> Result<()> {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let count = parse_arg(&args, "--count", 500usize);
    let clients = parse_arg(&args, "--clients", 30usize);
    let out = args
        .windows(2)
        .find(|w| w[0] == "--out")
        .map(|w| w[1].clone())
        .unwrap_or_else(|| "export.json".to_string());

    let mut rng = Pcg64::seed_from_u64(seed);
    let base = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();

    let pool: Vec<String> = (0..clients).map(|i| format!("CL{:05}", i + 1)).collect();
    let mut records: Vec<Value> = Vec::with_capacity(count);
    for i in 0..count {
        let sender = pool.choose(&mut rng).cloned().unwrap_or_default();
        let mut receiver = pool.choose(&mut rng).cloned().unwrap_or_default();
        while receiver == sender {
            receiver = pool.choose(&mut rng).cloned().unwrap_or_default();
        }

        let flagged = rng.gen_bool(0.08);
        let amount: f64 = if flagged {
            rng.gen_range(2_100_000.0..9_000_000.0)
        } else {
            rng.gen_range(10_000.0..900_000.0)
        };
        let hour: u32 = if flagged && rng.gen_bool(0.5) {
            rng.gen_range(0..5)
        } else {
            rng.gen_range(8..19)
        };
        let ts = base + Duration::days(rng.gen_range(0..21)) + Duration::hours(hour as i64);
        let sender_country = *COUNTRIES.choose(&mut rng).unwrap_or(&"KZ");
        let receiver_country = if flagged && rng.gen_bool(0.3) {
            "KY"
        } else {
            *COUNTRIES.choose(&mut rng).unwrap_or(&"KZ")
        };
        let channel = *["cash", "domestic", "international"].choose(&mut rng).unwrap_or(&"domestic");
        let purpose = *PURPOSES.choose(&mut rng).unwrap_or(&"payment");

        // Half modern layout, half the legacy wrapped layout.
        let record = if i % 2 == 0 {
            json!({
                "reference_id": format!("TX{seed}{i:07}"),
                "date": ts.to_rfc3339(),
                "amount": amount,
                "channel": channel,
                "sender_id": sender,
                "sender_name": format!("Client {sender}"),
                "sender_country": sender_country,
                "beneficiary_id": receiver,
                "beneficiary_name": format!("Client {receiver}"),
                "beneficiary_country": receiver_country,
                "purpose": purpose,
            })
        } else {
            json!({
                "row_to_json": {
                    "gmess_id": format!("TX{seed}{i:07}"),
                    "goper_trans_date": ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
                    "goper_tenge_amount": amount,
                    "goper_oper_type": legacy_channel_code(channel),
                    "gmember_maincode_pl1": sender,
                    "gmember_name_pl1": format!("Client {sender}"),
                    "gmember_residence_pl1": sender_country,
                    "gmember_maincode_pol1": receiver,
                    "gmember_name_pol1": format!("Client {receiver}"),
                    "gmember_residence_pol1": receiver_country,
                    "goper_dopinfo": purpose,
                }
            })
        };
        records.push(record);
    }

    std::fs::write(&out, serde_json::to_string_pretty(&records)?)?;
    println!("wrote {count} records ({clients} clients, seed {seed}) to {out}");
    Ok(())
}

fn legacy_channel_code(channel: &str) -> &'static str {
    match channel {
        "cash" => "1100",
        "international" => "2300",
        _ => "2100",
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
