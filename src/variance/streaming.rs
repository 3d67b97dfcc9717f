// ==============================================================================
// streaming.rs - Streaming Variance Aggregator
// ==============================================================================
// Description: Per-feature variance over a directory of shard files
// Author: Matt Barham
// Created: 2025-11-18
// Modified: 2026-10-18
// Version: 1.1.0
// ==============================================================================
// Memory is bounded by the number of distinct features, not by the number
// of shards or rows: each shard is folded into a small table and merged.
// ==============================================================================

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::SubjectRegistry;
use crate::error::{PipelineError, Result};
use crate::models::SubjectType;
use crate::stats::{ShardAccumulation, StatsTable};
use crate::validator::normalize_extension;
use crate::variance::FeatureVarianceMap;

/// Recursively list files ending in `extension`, sorted by path
pub fn discover_shards(base_dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let extension = normalize_extension(extension)?;
    let mut shards = Vec::new();

    for entry in WalkDir::new(base_dir).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| base_dir.to_path_buf());
            PipelineError::io(path, e.into())
        })?;

        if entry.file_type().is_file()
            && entry.file_name().to_string_lossy().ends_with(&extension)
        {
            shards.push(entry.into_path());
        }
    }

    shards.sort();
    debug!("Discovered {} '{}' shards under {:?}", shards.len(), extension, base_dir);
    Ok(shards)
}

/// Folds every shard of a subject into one statistics table
pub struct StreamingVarianceAggregator<'a> {
    registry: &'a SubjectRegistry,
    accumulation: ShardAccumulation,
}

impl<'a> StreamingVarianceAggregator<'a> {
    pub fn new(registry: &'a SubjectRegistry, accumulation: ShardAccumulation) -> Self {
        Self {
            registry,
            accumulation,
        }
    }

    /// Merged statistics of all shards; any shard error aborts the run
    pub fn aggregate_stats(
        &self,
        base_dir: &Path,
        extension: &str,
        subject: SubjectType,
    ) -> Result<StatsTable> {
        if self.accumulation == ShardAccumulation::OverwriteLegacy {
            warn!("Shard accumulation set to overwrite-legacy: intra-shard values are not summed");
        }
        let parser = self.registry.shard_parser(subject, self.accumulation)?;
        let shards = discover_shards(base_dir, extension)?;
        info!(
            "Aggregating {} {} shards ({} mode)",
            shards.len(),
            subject,
            self.accumulation
        );

        let mut global = StatsTable::new();
        for (idx, shard) in shards.iter().enumerate() {
            let table = parser.parse(shard)?;
            debug!(
                "[{}/{}] {:?}: {} features",
                idx + 1,
                shards.len(),
                shard,
                table.len()
            );
            global.merge(table);
        }

        info!("Aggregated {} features", global.len());
        Ok(global)
    }

    pub fn aggregate(
        &self,
        base_dir: &Path,
        extension: &str,
        subject: SubjectType,
    ) -> Result<FeatureVarianceMap> {
        Ok(self.aggregate_stats(base_dir, extension, subject)?.variances())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    const HEADER: &str = "\
# gene-model: GENCODE v36
gene_id\tgene_name\tgene_type\tfpkm_uq_unstranded
N_unmapped\t\t\t
N_multimapping\t\t\t
N_noFeature\t\t\t
N_ambiguous\t\t\t
";

    fn write_shard(dir: &Path, relative: &str, rows: &[(&str, &str)]) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut contents = HEADER.to_string();
        for (gene, value) in rows {
            contents.push_str(&format!("ENSG-{}\t{}\tprotein_coding\t{}\n", gene, gene, value));
        }
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_discover_shards_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "b/shard.tsv", &[]);
        write_shard(dir.path(), "a.tsv", &[]);
        write_shard(dir.path(), "notes.txt", &[]);

        let shards = discover_shards(dir.path(), "*.tsv").unwrap();
        assert_eq!(shards, vec![dir.path().join("a.tsv"), dir.path().join("b/shard.tsv")]);
    }

    #[test]
    fn test_discover_missing_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = discover_shards(&dir.path().join("absent"), "tsv");
        assert!(matches!(result, Err(PipelineError::Io { .. })));
    }

    #[test]
    fn test_three_shards_one_feature() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "s1.tsv", &[("BRCA1", "2.0")]);
        write_shard(dir.path(), "s2.tsv", &[("BRCA1", "4.0")]);
        write_shard(dir.path(), "s3.tsv", &[("BRCA1", "6.0")]);

        let registry = SubjectRegistry::new();
        let aggregator = StreamingVarianceAggregator::new(&registry, ShardAccumulation::Accumulate);
        let stats = aggregator
            .aggregate_stats(dir.path(), "tsv", SubjectType::Expression)
            .unwrap();

        let brca1 = stats.get("BRCA1").unwrap();
        assert_eq!(brca1.count, 3);
        assert_eq!(brca1.sum, 12.0);
        assert_eq!(brca1.sum_of_squares, 56.0);

        let variances = aggregator
            .aggregate(dir.path(), "tsv", SubjectType::Expression)
            .unwrap();
        assert!((variances["BRCA1"].unwrap() - 8.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_partition_does_not_change_result() {
        let registry = SubjectRegistry::new();
        let aggregator = StreamingVarianceAggregator::new(&registry, ShardAccumulation::Accumulate);

        let one = TempDir::new().unwrap();
        write_shard(
            one.path(),
            "all.tsv",
            &[("TP53", "1.5"), ("TP53", "3.5"), ("EGFR", "10"), ("TP53", "7.0")],
        );

        let many = TempDir::new().unwrap();
        write_shard(many.path(), "x/1.tsv", &[("TP53", "1.5")]);
        write_shard(many.path(), "x/2.tsv", &[("TP53", "3.5"), ("EGFR", "10")]);
        write_shard(many.path(), "y/3.tsv", &[("TP53", "7.0")]);

        let single = aggregator.aggregate(one.path(), "tsv", SubjectType::Expression).unwrap();
        let split = aggregator.aggregate(many.path(), "tsv", SubjectType::Expression).unwrap();

        assert_eq!(single.len(), split.len());
        for (name, variance) in &single {
            let (a, b) = (variance.unwrap(), split[name].unwrap());
            assert!((a - b).abs() < 1e-9, "{}: {} != {}", name, a, b);
        }
        assert_eq!(single["EGFR"], Some(0.0));
    }

    #[test]
    fn test_expression_has_no_missing_token() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "s1.tsv", &[("BRCA1", "NA"), ("TP53", "2.0")]);

        let registry = SubjectRegistry::new();
        let aggregator = StreamingVarianceAggregator::new(&registry, ShardAccumulation::Accumulate);
        assert!(aggregator.aggregate(dir.path(), "tsv", SubjectType::Expression).is_err());
    }

    #[test]
    fn test_methylation_undefined_variance() {
        let dir = TempDir::new().unwrap();
        let preamble = "p\t0\n".repeat(6);
        std::fs::write(dir.path().join("a.txt"), format!("{}cg1\tNA\ncg2\t0.5\n", preamble)).unwrap();
        std::fs::write(dir.path().join("b.txt"), format!("{}cg1\t\ncg2\t0.7\n", preamble)).unwrap();

        let registry = SubjectRegistry::new()
            .with_methylation_allow_list(crate::parsers::AllowList::new(["cg1", "cg2"]));
        let aggregator = StreamingVarianceAggregator::new(&registry, ShardAccumulation::Accumulate);
        let variances = aggregator.aggregate(dir.path(), "txt", SubjectType::Methylation).unwrap();

        assert_eq!(variances["cg1"], None);
        assert!((variances["cg2"].unwrap() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_legacy_overwrite_mode() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "s1.tsv", &[("BRCA1", "2.0"), ("BRCA1", "4.0")]);
        write_shard(dir.path(), "s2.tsv", &[("BRCA1", "6.0")]);

        let registry = SubjectRegistry::new();
        let legacy = StreamingVarianceAggregator::new(&registry, ShardAccumulation::OverwriteLegacy)
            .aggregate_stats(dir.path(), "tsv", SubjectType::Expression)
            .unwrap();
        let accumulate = StreamingVarianceAggregator::new(&registry, ShardAccumulation::Accumulate)
            .aggregate_stats(dir.path(), "tsv", SubjectType::Expression)
            .unwrap();

        assert_eq!(legacy.get("BRCA1").unwrap().count, 3);
        assert_eq!(legacy.get("BRCA1").unwrap().sum, 10.0);
        assert_eq!(accumulate.get("BRCA1").unwrap().sum, 12.0);
    }

    #[test]
    fn test_legacy_mode_is_logged() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "s1.tsv", &[("BRCA1", "2.0")]);
        let registry = SubjectRegistry::new();

        let run = |accumulation| {
            let logs = CapturedLogs::default();
            let writer = logs.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::WARN)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();
            tracing::subscriber::with_default(subscriber, || {
                StreamingVarianceAggregator::new(&registry, accumulation)
                    .aggregate(dir.path(), "tsv", SubjectType::Expression)
                    .unwrap();
            });
            logs.contents()
        };

        assert!(run(ShardAccumulation::OverwriteLegacy).contains("overwrite-legacy"));
        assert!(!run(ShardAccumulation::Accumulate).contains("overwrite-legacy"));
    }

    #[test]
    fn test_malformed_shard_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_shard(dir.path(), "good.tsv", &[("BRCA1", "2.0")]);
        write_shard(dir.path(), "zbad.tsv", &[("BRCA1", "two")]);

        let registry = SubjectRegistry::new();
        let aggregator = StreamingVarianceAggregator::new(&registry, ShardAccumulation::Accumulate);
        match aggregator.aggregate(dir.path(), "tsv", SubjectType::Expression) {
            Err(PipelineError::MalformedRecord { path, line, .. }) => {
                assert_eq!(path, dir.path().join("zbad.tsv"));
                assert_eq!(line, 7);
            }
            other => panic!("expected malformed record, got {:?}", other),
        }
    }
}
