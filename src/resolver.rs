// ==============================================================================
// resolver.rs - Patient File Resolver
// ==============================================================================
// Description: Maps catalog records to one local measurement file per patient
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use std::collections::btree_map::Entry;
use std::path::Path;
use tracing::debug;

use crate::models::{CatalogRecord, PatientFile, PatientFileMap};

/// Which catalog records are eligible for ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverFilter {
    pub project_prefix: String,
    pub file_suffix: String,
    pub sample_type: String,
}

impl ResolverFilter {
    pub fn accepts(&self, record: &CatalogRecord) -> bool {
        record.project_id.starts_with(&self.project_prefix)
            && record.file_name.ends_with(&self.file_suffix)
            && record.sample_type == self.sample_type
    }
}

/// Builds the patient -> file map; touches no files
pub struct PatientFileResolver {
    filter: ResolverFilter,
}

impl PatientFileResolver {
    pub fn new(filter: ResolverFilter) -> Self {
        Self { filter }
    }

    /// Resolve `base_dir / file_id / file_name` per patient
    ///
    /// Several files for one patient are treated as replicates: the first
    /// accepted record in input order wins.
    pub fn resolve(&self, records: &[CatalogRecord], base_dir: &Path) -> PatientFileMap {
        let mut map = PatientFileMap::new();
        let mut duplicates = 0usize;

        for record in records.iter().filter(|r| self.filter.accepts(r)) {
            match map.entry(record.submitter_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(PatientFile {
                        path: base_dir.join(&record.file_id).join(&record.file_name),
                        file_id: record.file_id.clone(),
                    });
                }
                Entry::Occupied(_) => duplicates += 1,
            }
        }

        debug!(
            "Resolved {} patients from {} catalog records ({} duplicate files ignored)",
            map.len(),
            records.len(),
            duplicates
        );

        map
    }
}
