// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for omics measurement file formats
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

pub mod layout;
pub mod measurement;
pub mod shard;

pub use layout::{Column, ColumnLayout};
pub use measurement::{AllowList, Measurement, RecordParser};
pub use shard::VarianceShardParser;
