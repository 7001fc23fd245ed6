//! Run configuration: an immutable snapshot built once at startup and
//! passed by reference to the scheduler, evaluators and sink.
//!
//! Weighting and threshold values are policy, not mechanism. The defaults
//! below mirror the regulator's published reference values but every one of
//! them can be overridden from a JSON config file or the CLI.

use crate::error::{AmlError, AmlResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

const WEIGHT_EPSILON: f64 = 1e-3;

/// Relative weight of each risk profile in the final score. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProfileWeights {
    pub transaction: f64,
    pub network: f64,
    pub customer: f64,
    pub behavioral: f64,
    pub geographic: f64,
}

impl Default for ProfileWeights {
    fn default() -> Self {
        Self {
            transaction: 0.40,
            network: 0.30,
            customer: 0.15,
            behavioral: 0.10,
            geographic: 0.05,
        }
    }
}

impl ProfileWeights {
    pub fn sum(&self) -> f64 {
        self.transaction + self.network + self.customer + self.behavioral + self.geographic
    }
}

/// Amount thresholds per operation category, in base currency units.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Thresholds {
    pub cash_operations: f64,
    pub international_transfers: f64,
    pub domestic_transfers: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cash_operations: 2_000_000.0,
            international_transfers: 1_000_000.0,
            domestic_transfers: 7_000_000.0,
        }
    }
}

/// Final-score cuts for the discrete risk level. high must exceed medium.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskCuts {
    pub medium: f64,
    pub high: f64,
}

impl Default for RiskCuts {
    fn default() -> Self {
        Self { medium: 2.0, high: 5.0 }
    }
}

/// Country risk classification lists (ISO alpha-2, upper case).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryRisk {
    pub fatf_blacklist: HashSet<String>,
    pub fatf_greylist: HashSet<String>,
    pub sanctioned: HashSet<String>,
    pub offshore_zones: HashSet<String>,
    /// Domestic economic bloc, treated as lowest risk.
    pub low_risk_bloc: HashSet<String>,
}

fn set(codes: &[&str]) -> HashSet<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

impl Default for CountryRisk {
    fn default() -> Self {
        Self {
            fatf_blacklist: set(&["IR", "KP"]),
            fatf_greylist: set(&[
                "AF", "AL", "BB", "BF", "KH", "CM", "HR", "GH", "GI", "JM", "JO", "ML", "MZ",
                "MM", "NI", "PK", "PA", "PH", "SN", "SO", "SS", "SY", "TR", "UG", "AE", "VU",
                "YE",
            ]),
            sanctioned: set(&["RU", "BY", "IR", "KP", "AF", "MM", "SY"]),
            offshore_zones: set(&[
                "AD", "AG", "BS", "BH", "BB", "BZ", "BM", "VG", "KY", "CK", "CW", "CY", "DM",
                "GI", "GG", "GD", "HK", "IM", "JE", "KN", "LB", "LR", "LI", "LU", "MO", "MT",
                "MH", "MU", "MC", "NR", "NU", "PA", "WS", "SM", "SC", "SG", "LC", "VC", "CH",
                "TO", "TC", "VU", "VE",
            ]),
            low_risk_bloc: set(&["KZ", "RU", "BY", "AM", "KG"]),
        }
    }
}

impl CountryRisk {
    /// Risk score of a country in [0, 10]. Unknown codes are neutral.
    pub fn country_score(&self, code: &str) -> f64 {
        if code.is_empty() {
            return 5.0;
        }
        if self.fatf_blacklist.contains(code) {
            10.0
        } else if self.sanctioned.contains(code) {
            8.0
        } else if self.fatf_greylist.contains(code) || self.offshore_zones.contains(code) {
            5.0
        } else if self.low_risk_bloc.contains(code) {
            1.0
        } else {
            3.0
        }
    }
}

/// Coefficients of the connection-strength formula (see graph module).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrengthWeights {
    pub count_weight: f64,
    pub amount_weight: f64,
}

impl Default for StrengthWeights {
    fn default() -> Self {
        Self { count_weight: 1.6, amount_weight: 1.2 }
    }
}

/// The full run configuration. Construct via `RunConfig::default()`,
/// `RunConfig::load()`, or field-by-field before `validate()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_workers: usize,
    pub batch_size: usize,
    /// Work queue capacity = max_workers * queue_multiplier (backpressure).
    pub queue_multiplier: usize,
    pub profile_weights: ProfileWeights,
    pub thresholds: Thresholds,
    pub risk_cuts: RiskCuts,
    pub timeout_per_batch_secs: u64,
    pub max_retries: u32,
    /// How long in-flight batches may run after cancellation.
    pub grace_period_secs: u64,
    pub strength: StrengthWeights,
    pub country_risk: CountryRisk,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_workers: default_workers(),
            batch_size: 500,
            queue_multiplier: 2,
            profile_weights: ProfileWeights::default(),
            thresholds: Thresholds::default(),
            risk_cuts: RiskCuts::default(),
            timeout_per_batch_secs: 300,
            max_retries: 3,
            grace_period_secs: 10,
            strength: StrengthWeights::default(),
            country_risk: CountryRisk::default(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl RunConfig {
    /// Load configuration from a JSON file. Missing fields fall back to
    /// defaults; a missing file is a configuration error.
    pub fn load(path: &Path) -> AmlResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AmlError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: RunConfig = serde_json::from_str(&text)
            .map_err(|e| AmlError::Config(format!("invalid config {}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn timeout_per_batch(&self) -> Duration {
        Duration::from_secs(self.timeout_per_batch_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn queue_capacity(&self) -> usize {
        (self.max_workers * self.queue_multiplier).max(1)
    }

    /// Fatal at startup, before any batch is dispatched.
    pub fn validate(&self) -> AmlResult<()> {
        let sum = self.profile_weights.sum();
        if (sum - 1.0).abs() > WEIGHT_EPSILON {
            return Err(AmlError::Config(format!(
                "profile weights must sum to 1.0, got {sum:.4}"
            )));
        }
        let w = &self.profile_weights;
        for (name, value) in [
            ("transaction", w.transaction),
            ("network", w.network),
            ("customer", w.customer),
            ("behavioral", w.behavioral),
            ("geographic", w.geographic),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AmlError::Config(format!(
                    "profile weight '{name}' out of [0,1]: {value}"
                )));
            }
        }
        if self.risk_cuts.high <= self.risk_cuts.medium {
            return Err(AmlError::Config(format!(
                "risk cuts must be monotonic: high {} <= medium {}",
                self.risk_cuts.high, self.risk_cuts.medium
            )));
        }
        if self.max_workers == 0 {
            return Err(AmlError::Config("max_workers must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(AmlError::Config("batch_size must be > 0".into()));
        }
        if self.max_retries == 0 {
            return Err(AmlError::Config("max_retries must be > 0".into()));
        }
        let t = &self.thresholds;
        for (name, value) in [
            ("cash_operations", t.cash_operations),
            ("international_transfers", t.international_transfers),
            ("domestic_transfers", t.domestic_transfers),
        ] {
            if value <= 0.0 {
                return Err(AmlError::Config(format!("threshold '{name}' must be > 0")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        RunConfig::default().validate().unwrap();
    }

    #[test]
    fn bad_weight_sum_rejected() {
        let mut config = RunConfig::default();
        config.profile_weights.transaction = 0.80;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AmlError::Config(_)), "expected config error, got {err}");
    }

    #[test]
    fn non_monotonic_cuts_rejected() {
        let mut config = RunConfig::default();
        config.risk_cuts = RiskCuts { medium: 6.0, high: 4.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = RunConfig::default();
        config.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn country_scores_ordered_by_severity() {
        let risk = CountryRisk::default();
        assert_eq!(risk.country_score("IR"), 10.0);
        assert_eq!(risk.country_score("RU"), 8.0);
        assert_eq!(risk.country_score("PA"), 5.0);
        assert_eq!(risk.country_score("KZ"), 1.0);
        assert_eq!(risk.country_score("DE"), 3.0);
        assert_eq!(risk.country_score(""), 5.0);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RunConfig = serde_json::from_str(r#"{"batch_size": 50}"#).unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_retries, 3);
        config.validate().unwrap();
    }
}
