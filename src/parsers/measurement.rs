// ==============================================================================
// measurement.rs - Omics Measurement File Parser
// ==============================================================================
// Description: Parses expression, micro-RNA and methylation files into records
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2026-10-18
// Version: 1.2.0
// ==============================================================================
// Formats (tab-delimited, 6 preamble lines):
//   expression:  gene_id  gene_name  gene_type  unstranded ... fpkm_uq_unstranded
//   micro-RNA:   miRNA_ID  read_count  reads_per_million_miRNA_mapped  cross-mapped
//   methylation: probe_id  beta
// ==============================================================================

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::error::{PipelineError, Result};
use crate::models::{MeasurementRecord, SubjectType};
use crate::parsers::layout::{
    ColumnLayout, Row, EXPRESSION_LAYOUT, METHYLATION_LAYOUT, MICRO_RNA_LAYOUT,
};
use crate::validator::parse_feature_list;

/// Fixed set of features kept from methylation files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllowList {
    features: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            features: features.into_iter().map(Into::into).collect(),
        }
    }

    /// Load one feature per line
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

        let list = Self::new(parse_feature_list(&contents));
        if list.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "allow-list {:?} contains no features",
                path
            )));
        }
        Ok(list)
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// One parsed row before it is turned into a stored record
pub struct Measurement<'a> {
    pub line: usize,
    pub name: &'a str,
    pub value: Option<f64>,
    pub row: &'a Row<'a>,
}

/// Parser for one subject's measurement files
#[derive(Debug, Clone)]
pub enum RecordParser {
    Expression,
    MicroRna,
    Methylation { allow_list: Arc<AllowList> },
}

impl RecordParser {
    pub fn subject(&self) -> SubjectType {
        match self {
            RecordParser::Expression => SubjectType::Expression,
            RecordParser::MicroRna => SubjectType::MicroRna,
            RecordParser::Methylation { .. } => SubjectType::Methylation,
        }
    }

    pub fn layout(&self) -> &'static ColumnLayout {
        match self {
            RecordParser::Expression => &EXPRESSION_LAYOUT,
            RecordParser::MicroRna => &MICRO_RNA_LAYOUT,
            RecordParser::Methylation { .. } => &METHYLATION_LAYOUT,
        }
    }

    /// Whether a feature should be kept at all
    pub fn admits(&self, name: &str) -> bool {
        match self {
            RecordParser::Methylation { allow_list } => allow_list.contains(name),
            _ => true,
        }
    }

    /// Walk the admitted measurements of a file without materializing it
    ///
    /// A row without the name/value columns or with an unparsable value
    /// stops the walk with `MalformedRecord`.
    pub fn visit<F>(&self, path: &Path, mut visit: F) -> Result<()>
    where
        F: FnMut(Measurement<'_>) -> Result<()>,
    {
        let layout = self.layout();

        layout.visit_rows(path, |row| {
            let (name, value_token) = match (row.get(layout.name), row.get(layout.value)) {
                (Some(name), Some(value)) => (name.trim(), value),
                _ => {
                    return Err(PipelineError::MalformedRecord {
                        path: path.to_path_buf(),
                        line: row.line,
                        details: format!("row has only {} columns", row.fields.len()),
                    })
                }
            };

            if name.is_empty() {
                return Err(PipelineError::MalformedRecord {
                    path: path.to_path_buf(),
                    line: row.line,
                    details: "empty feature name".to_string(),
                });
            }

            // Disallowed features are dropped before the value is looked at
            if !self.admits(name) {
                return Ok(());
            }

            let value = layout.parse_value(value_token, path, row.line)?;

            visit(Measurement {
                line: row.line,
                name,
                value,
                row: &row,
            })
        })
    }

    /// Parse a whole file into records for one patient
    ///
    /// Either every admitted row is returned or an error; never a prefix.
    pub fn parse(
        &self,
        path: &Path,
        patient: &str,
        sample: Option<&str>,
    ) -> Result<Vec<MeasurementRecord>> {
        let layout = self.layout();
        let mut records = Vec::new();

        self.visit(path, |measurement| {
            let metadata: HashMap<String, String> = layout
                .metadata
                .iter()
                .filter_map(|column| {
                    measurement
                        .row
                        .get(*column)
                        .map(|value| (measurement.row.column_name(*column), value.trim().to_string()))
                })
                .collect();

            records.push(MeasurementRecord {
                name: measurement.name.to_string(),
                value: measurement.value,
                patient: patient.to_string(),
                sample: sample.map(str::to_string),
                metadata,
            });
            Ok(())
        })?;

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const EXPRESSION_FILE: &str = "\
# gene-model: GENCODE v36
gene_id\tgene_name\tgene_type\tunstranded\tstranded_first\tstranded_second\ttpm_unstranded\tfpkm_unstranded\tfpkm_uq_unstranded
N_unmapped\t\t\t100\t100\t100\t\t\t
N_multimapping\t\t\t10\t10\t10\t\t\t
N_noFeature\t\t\t5\t5\t5\t\t\t
N_ambiguous\t\t\t1\t1\t1\t\t\t
ENSG00000000003.15\tTSPAN6\tprotein_coding\t2000\t1000\t1000\t30.5\t10.1\t12.25
ENSG00000012048.23\tBRCA1\tprotein_coding\t500\t250\t250\t4.0\t1.5\t2.5
";

    const MICRO_RNA_FILE: &str = "\
miRNA_ID\tread_count\treads_per_million_miRNA_mapped\tcross-mapped
hsa-let-7a-1\t100\t1000.5\tN
hsa-let-7a-2\t100\t1000.5\tN
hsa-let-7a-3\t100\t1000.5\tN
hsa-let-7b\t50\t500.0\tN
hsa-let-7c\t20\t200.0\tN
hsa-mir-21\t3000\t31250.75\tY
hsa-mir-155\t0\t0\tN
";

    const METHYLATION_FILE: &str = "\
p0\t0.1
p1\t0.1
p2\t0.1
p3\t0.1
p4\t0.1
p5\t0.1
cg00000029\t0.4512
cg00000108\tNA
cg99999999\t0.9
cg00000109\t
";

    #[test]
    fn test_parse_expression() {
        let file = create_test_file(EXPRESSION_FILE);
        let records = RecordParser::Expression
            .parse(file.path(), "TCGA-AA-0001", Some("file-1"))
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "TSPAN6");
        assert_eq!(records[0].value, Some(12.25));
        assert_eq!(records[0].patient, "TCGA-AA-0001");
        assert_eq!(records[0].sample.as_deref(), Some("file-1"));
        assert_eq!(records[0].metadata["gene_id"], "ENSG00000000003.15");
        assert_eq!(records[0].metadata["gene_type"], "protein_coding");
        assert_eq!(records[0].metadata["stranded_first"], "1000");
        assert_eq!(records[0].metadata["fpkm_unstranded"], "10.1");
        assert_eq!(records[0].metadata.len(), 6);
        assert_eq!(records[1].name, "BRCA1");
        assert_eq!(records[1].value, Some(2.5));
    }

    #[test]
    fn test_parse_micro_rna() {
        let file = create_test_file(MICRO_RNA_FILE);
        let records = RecordParser::MicroRna
            .parse(file.path(), "TCGA-AA-0002", None)
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "hsa-mir-21");
        assert_eq!(records[0].value, Some(31250.75));
        assert_eq!(records[0].metadata["read_count"], "3000");
        assert_eq!(records[0].metadata["cross-mapped"], "Y");
        assert_eq!(records[1].value, Some(0.0));
    }

    #[test]
    fn test_methylation_allow_list_and_missing() {
        let file = create_test_file(METHYLATION_FILE);
        let parser = RecordParser::Methylation {
            allow_list: Arc::new(AllowList::new(["cg00000029", "cg00000108", "cg00000109"])),
        };

        let records = parser.parse(file.path(), "TCGA-AA-0003", None).unwrap();

        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.name != "cg99999999"));
        assert_eq!(records[0].value, Some(0.4512));
        assert_eq!(records[1].value, None);
        assert_eq!(records[2].value, None);
        assert!(records[0].metadata.is_empty());
    }

    #[test]
    fn test_disallowed_row_produces_nothing() {
        let file = create_test_file(METHYLATION_FILE);
        let parser = RecordParser::Methylation {
            allow_list: Arc::new(AllowList::new(["cg99999999"])),
        };

        let records = parser.parse(file.path(), "TCGA-AA-0003", None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "cg99999999");
    }

    #[test]
    fn test_malformed_value_aborts_file() {
        let contents = METHYLATION_FILE.replace("0.9", "n/a?");
        let file = create_test_file(&contents);
        let parser = RecordParser::Methylation {
            allow_list: Arc::new(AllowList::new(["cg00000029", "cg99999999"])),
        };

        match parser.parse(file.path(), "TCGA-AA-0003", None) {
            Err(PipelineError::MalformedRecord { line, details, .. }) => {
                assert_eq!(line, 9);
                assert!(details.contains("n/a?"));
            }
            other => panic!("Expected MalformedRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_disallowed_malformed_value_is_ignored() {
        let contents = METHYLATION_FILE.replace("0.9", "garbage");
        let file = create_test_file(&contents);
        let parser = RecordParser::Methylation {
            allow_list: Arc::new(AllowList::new(["cg00000029"])),
        };

        let records = parser.parse(file.path(), "TCGA-AA-0003", None).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_short_row_is_malformed() {
        let contents = format!("{}onlyname\n", METHYLATION_FILE);
        let file = create_test_file(&contents);
        let parser = RecordParser::Methylation {
            allow_list: Arc::new(AllowList::new(["onlyname"])),
        };

        assert!(matches!(
            parser.parse(file.path(), "p", None),
            Err(PipelineError::MalformedRecord { line: 11, .. })
        ));
    }

    #[test]
    fn test_expression_na_is_malformed() {
        let contents = EXPRESSION_FILE.replace("\t2.5\n", "\tNA\n");
        let file = create_test_file(&contents);

        assert!(matches!(
            RecordParser::Expression.parse(file.path(), "p", None),
            Err(PipelineError::MalformedRecord { line: 8, .. })
        ));
    }

    #[test]
    fn test_duplicate_features_are_kept() {
        let contents = format!("{}cg00000029\t0.1\n", METHYLATION_FILE);
        let file = create_test_file(&contents);
        let parser = RecordParser::Methylation {
            allow_list: Arc::new(AllowList::new(["cg00000029"])),
        };

        let records = parser.parse(file.path(), "p", None).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = RecordParser::Expression.parse(Path::new("/nonexistent/file.tsv"), "p", None);
        assert!(matches!(result, Err(PipelineError::Io { .. })));
    }

    #[test]
    fn test_allow_list_from_file() {
        let file = create_test_file("# header\ncg1\ncg2\n");
        let list = AllowList::from_file(file.path()).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.contains("cg1"));

        let empty = create_test_file("# nothing\n");
        assert!(AllowList::from_file(empty.path()).is_err());
    }
}
