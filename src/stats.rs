// ==============================================================================
// stats.rs - Streaming Feature Statistics
// ==============================================================================
// Description: Mergeable (sum, sum of squares, count) accumulators and summaries
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2026-10-18
// Version: 1.1.0
// ==============================================================================
// Merging two FeatureStats is field-wise addition, so any partition of the
// observations into shards yields the same totals.
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Running statistics for one feature
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub sum: f64,
    pub sum_of_squares: f64,
    pub count: u64,
}

impl FeatureStats {
    /// Stats for a single observation
    pub fn from_value(value: f64) -> Self {
        Self {
            sum: value,
            sum_of_squares: value * value,
            count: 1,
        }
    }

    pub fn observe(&mut self, value: f64) {
        self.sum += value;
        self.sum_of_squares += value * value;
        self.count += 1;
    }

    /// Replace sum and sum of squares with the latest value, count still grows
    ///
    /// Reproduces the historical per-shard routine; see `ShardAccumulation`.
    pub fn overwrite(&mut self, value: f64) {
        self.sum = value;
        self.sum_of_squares = value * value;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &FeatureStats) {
        self.sum += other.sum;
        self.sum_of_squares += other.sum_of_squares;
        self.count += other.count;
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / self.count as f64)
    }

    /// Population variance: E[x²] − E[x]², `None` when count is zero
    pub fn variance(&self) -> Option<f64> {
        let mean = self.mean()?;
        let variance = self.sum_of_squares / self.count as f64 - mean * mean;

        // Cancellation can leave a tiny negative residue
        if variance < 0.0 {
            Some(0.0)
        } else {
            Some(variance)
        }
    }
}

/// How values are folded together inside a single shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShardAccumulation {
    /// Every value in the shard contributes to sum and sum of squares
    #[default]
    Accumulate,
    /// Only the last value per feature survives in sum and sum of squares
    /// while count still counts every value (legacy variance artifacts)
    OverwriteLegacy,
}

impl FromStr for ShardAccumulation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accumulate" => Ok(ShardAccumulation::Accumulate),
            "overwrite-legacy" | "overwrite" | "legacy" => Ok(ShardAccumulation::OverwriteLegacy),
            other => Err(format!(
                "unknown shard accumulation '{}' (expected accumulate or overwrite-legacy)",
                other
            )),
        }
    }
}

impl fmt::Display for ShardAccumulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardAccumulation::Accumulate => f.write_str("accumulate"),
            ShardAccumulation::OverwriteLegacy => f.write_str("overwrite-legacy"),
        }
    }
}

/// Feature name -> running statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsTable {
    features: HashMap<String, FeatureStats>,
}

impl StatsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, value: f64, mode: ShardAccumulation) {
        match self.features.get_mut(name) {
            Some(stats) => match mode {
                ShardAccumulation::Accumulate => stats.observe(value),
                ShardAccumulation::OverwriteLegacy => stats.overwrite(value),
            },
            None => {
                self.features
                    .insert(name.to_string(), FeatureStats::from_value(value));
            }
        }
    }

    /// Fold another table in; consumes it so shard tables are dropped right away
    pub fn merge(&mut self, other: StatsTable) {
        for (name, stats) in other.features {
            self.features.entry(name).or_default().merge(&stats);
        }
    }

    pub fn get(&self, name: &str) -> Option<&FeatureStats> {
        self.features.get(name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Make sure a feature is present even if it has no observations
    pub fn touch(&mut self, name: &str) {
        self.features.entry(name.to_string()).or_default();
    }

    /// Variance per feature in name order
    pub fn variances(&self) -> BTreeMap<String, Option<f64>> {
        self.features
            .iter()
            .map(|(name, stats)| (name.clone(), stats.variance()))
            .collect()
    }
}

/// Unbiased (n − 1) variance of a sample
///
/// One observation has variance 0; no observations is undefined.
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    match values.len() {
        0 => None,
        1 => Some(0.0),
        n => {
            let mean = values.iter().sum::<f64>() / n as f64;
            let squared: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            Some(squared / (n - 1) as f64)
        }
    }
}

/// Descriptive statistics over a distribution (count, mean, std, quartiles)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

impl Summary {
    /// Summarize finite values; non-finite inputs are ignored
    pub fn describe(values: impl IntoIterator<Item = f64>) -> Self {
        let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let mean = if count == 0 {
            None
        } else {
            Some(sorted.iter().sum::<f64>() / count as f64)
        };

        // Single values have no spread to estimate
        let std = if count < 2 {
            None
        } else {
            sample_variance(&sorted).map(f64::sqrt)
        };

        Self {
            count,
            mean,
            std,
            min: sorted.first().copied(),
            q25: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q75: quantile(&sorted, 0.75),
            max: sorted.last().copied(),
        }
    }
}

/// Linear-interpolated quantile over sorted values
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}
