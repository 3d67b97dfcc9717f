// ==============================================================================
// variance/mod.rs - Feature Variance
// ==============================================================================
// Description: Streaming shard aggregation and store-backed variance tables
// Author: Matt Barham
// Created: 2025-11-18
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

pub mod streaming;
pub mod table;

use std::collections::BTreeMap;

/// Feature name -> variance, `None` where no value was observed
pub type FeatureVarianceMap = BTreeMap<String, Option<f64>>;

pub use streaming::{discover_shards, StreamingVarianceAggregator};
pub use table::{NamesSource, VarianceTable, VarianceTableBuilder};
