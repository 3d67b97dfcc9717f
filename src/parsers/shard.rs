// ==============================================================================
// shard.rs - Variance Shard Parser
// ==============================================================================
// Description: Folds one shard file into per-feature running statistics
// Author: Matt Barham
// Created: 2025-11-18
// Modified: 2026-10-18
// Version: 1.1.0
// ==============================================================================

use std::path::Path;

use crate::error::Result;
use crate::models::SubjectType;
use crate::parsers::measurement::RecordParser;
use crate::stats::{ShardAccumulation, StatsTable};

/// Parses a shard into a single-shard `StatsTable`
///
/// Rows are streamed; only the per-feature accumulators are kept in memory.
/// Values marked as not available are not observations and are skipped.
#[derive(Debug, Clone)]
pub struct VarianceShardParser {
    parser: RecordParser,
    accumulation: ShardAccumulation,
}

impl VarianceShardParser {
    pub fn new(parser: RecordParser, accumulation: ShardAccumulation) -> Self {
        Self {
            parser,
            accumulation,
        }
    }

    pub fn subject(&self) -> SubjectType {
        self.parser.subject()
    }

    pub fn accumulation(&self) -> ShardAccumulation {
        self.accumulation
    }

    pub fn parse(&self, path: &Path) -> Result<StatsTable> {
        let mut table = StatsTable::new();

        self.parser.visit(path, |measurement| {
            match measurement.value {
                Some(value) => table.record(measurement.name, value, self.accumulation),
                None => table.touch(measurement.name),
            }
            Ok(())
        })?;

        Ok(table)
    }
}
