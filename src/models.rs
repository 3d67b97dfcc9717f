// ==============================================================================
// models.rs - Omics Data Models
// ==============================================================================
// Description: Data structures shared by ingestion and variance aggregation
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-10-18
// Version: 3.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Assay family of a measurement file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SubjectType {
    /// Gene expression (mRNA, STAR augmented gene counts)
    Expression,
    /// Micro-RNA quantification
    MicroRna,
    /// DNA methylation array betas
    Methylation,
}

impl SubjectType {
    pub const ALL: [SubjectType; 3] = [
        SubjectType::Expression,
        SubjectType::MicroRna,
        SubjectType::Methylation,
    ];

    /// Short code used on the command line and as default collection name
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectType::Expression => "mRNA",
            SubjectType::MicroRna => "miRNA",
            SubjectType::Methylation => "DNAm",
        }
    }
}

impl fmt::Display for SubjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mrna" | "expression" => Ok(SubjectType::Expression),
            "mirna" | "micro-rna" | "microrna" => Ok(SubjectType::MicroRna),
            "dnam" | "methylation" => Ok(SubjectType::Methylation),
            other => Err(format!(
                "unknown subject '{}' (expected mRNA, miRNA or DNAm)",
                other
            )),
        }
    }
}

/// One file entry returned by the external catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(rename = "file_name")]
    pub file_name: String,

    /// Remote file identifier (also the download directory name)
    #[serde(rename = "id")]
    pub file_id: String,

    #[serde(rename = "cases.0.submitter_id")]
    pub submitter_id: String,

    #[serde(rename = "cases.0.samples.0.sample_type")]
    pub sample_type: String,

    #[serde(rename = "cases.0.project.project_id")]
    pub project_id: String,

    #[serde(rename = "cases.0.project.primary_site", default)]
    pub primary_site: Option<String>,
}

/// Local file resolved for one patient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientFile {
    /// `base_dir / file_id / file_name`
    pub path: PathBuf,
    /// Remote file id, stored as the record's sample
    pub file_id: String,
}

/// Patient id -> local file, iterated in sorted patient order
pub type PatientFileMap = BTreeMap<String, PatientFile>;

/// Atomic unit of storage: one feature value for one patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Feature identifier (gene, miRNA or probe)
    pub name: String,

    /// Measured value, `None` when the source marks it as not available
    pub value: Option<f64>,

    /// Patient submitter id
    pub patient: String,

    /// Sample (file) the value came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,

    /// Auxiliary columns, subject dependent
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_round_trip_codes() {
        for subject in SubjectType::ALL {
            assert_eq!(subject.as_str().parse::<SubjectType>().unwrap(), subject);
        }
        assert_eq!("Methylation".parse::<SubjectType>().unwrap(), SubjectType::Methylation);
        assert!("proteome".parse::<SubjectType>().is_err());
    }

    #[test]
    fn test_measurement_serde_omits_empty_fields() {
        let record = MeasurementRecord {
            name: "cg00000029".to_string(),
            value: None,
            patient: "TCGA-AA-0001".to_string(),
            sample: None,
            metadata: HashMap::new(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["value"], serde_json::Value::Null);
        assert!(json.get("metadata").is_none());
        assert!(json.get("sample").is_none());
    }
}
