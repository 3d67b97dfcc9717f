// ==============================================================================
// error.rs - Pipeline Error Taxonomy
// ==============================================================================
// Description: Errors raised by ingestion, parsing and variance aggregation
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur anywhere in the pipeline
///
/// Fatal for a run: `CatalogUnavailable`, `StoreUnavailable`, `InvalidConfig`.
/// Isolated per patient during ingestion: `MissingFile`, `MalformedRecord`.
/// During streaming aggregation every shard error is fatal.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Document store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    #[error("Missing file for patient {patient}: {path:?}")]
    MissingFile { patient: String, path: PathBuf },

    #[error("Malformed record in {path:?} at line {line}: {details}")]
    MalformedRecord {
        path: PathBuf,
        line: usize,
        details: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Variance artifact error: {0}")]
    Artifact(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error only affects a single patient during ingestion
    pub fn is_patient_scoped(&self) -> bool {
        matches!(
            self,
            PipelineError::MissingFile { .. }
                | PipelineError::MalformedRecord { .. }
                | PipelineError::Io { .. }
        )
    }
}
