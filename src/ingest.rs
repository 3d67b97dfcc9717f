// ==============================================================================
// ingest.rs - Resumable Collection Ingestion
// ==============================================================================
// Description: Catalog -> patient files -> parsed records -> document store
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditEventType};
use crate::catalog::CatalogSource;
use crate::config::{Settings, SubjectRegistry};
use crate::error::{PipelineError, Result};
use crate::models::{PatientFileMap, SubjectType};
use crate::resolver::PatientFileResolver;
use crate::store::{DocumentStore, StoreField, MEASUREMENT_INDEXES};
use crate::validator::validate_collection_name;

/// Outcome of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub collection: String,
    pub inserted_patients: Vec<String>,
    /// Patients already present in the collection
    pub skipped_existing: Vec<String>,
    pub missing_files: Vec<(String, PathBuf)>,
    pub malformed_files: Vec<(String, String)>,
    pub records_inserted: usize,
}

impl IngestReport {
    fn new(run_id: Uuid, collection: &str) -> Self {
        Self {
            run_id,
            collection: collection.to_string(),
            inserted_patients: Vec::new(),
            skipped_existing: Vec::new(),
            missing_files: Vec::new(),
            malformed_files: Vec::new(),
            records_inserted: 0,
        }
    }
}

/// Ingests one subject type into one collection
pub struct IngestionPipeline<'a> {
    registry: &'a SubjectRegistry,
    catalog: &'a dyn CatalogSource,
    settings: &'a Settings,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(
        registry: &'a SubjectRegistry,
        catalog: &'a dyn CatalogSource,
        settings: &'a Settings,
    ) -> Self {
        Self {
            registry,
            catalog,
            settings,
        }
    }

    /// Run ingestion
    ///
    /// With `override_existing` the collection is rebuilt from scratch.
    /// Otherwise patients already stored are skipped, so an interrupted run
    /// can simply be started again.
    pub async fn run(
        &self,
        subject: SubjectType,
        base_dir: &Path,
        store: &mut dyn DocumentStore,
        collection: &str,
        override_existing: bool,
    ) -> Result<IngestReport> {
        validate_collection_name(collection)?;

        let run_id = Uuid::new_v4();
        info!(
            "Starting ingestion run {} ({} -> {}, override: {})",
            run_id, subject, collection, override_existing
        );
        record(
            store,
            run_id,
            AuditEventType::RunStarted,
            collection,
            None,
            json!({
                "subject": subject.as_str(),
                "base_dir": base_dir.display().to_string(),
                "override": override_existing,
            }),
        )?;

        match self
            .ingest(run_id, subject, base_dir, store, collection, override_existing)
            .await
        {
            Ok(report) => {
                record(
                    store,
                    run_id,
                    AuditEventType::RunCompleted,
                    collection,
                    None,
                    json!({
                        "inserted_patients": report.inserted_patients.len(),
                        "skipped_existing": report.skipped_existing.len(),
                        "missing_files": report.missing_files.len(),
                        "malformed_files": report.malformed_files.len(),
                        "records_inserted": report.records_inserted,
                    }),
                )?;
                info!(
                    "Ingestion run {} complete: {} patients, {} records",
                    run_id,
                    report.inserted_patients.len(),
                    report.records_inserted
                );
                Ok(report)
            }
            Err(e) => {
                error!("Ingestion run {} failed: {}", run_id, e);
                let failed = AuditEvent::new(
                    run_id,
                    AuditEventType::RunFailed,
                    collection,
                    None,
                    json!({ "error": e.to_string() }),
                );
                if let Err(audit_err) = store.record_event(&failed) {
                    warn!("Could not record failure of run {}: {}", run_id, audit_err);
                }
                Err(e)
            }
        }
    }

    async fn ingest(
        &self,
        run_id: Uuid,
        subject: SubjectType,
        base_dir: &Path,
        store: &mut dyn DocumentStore,
        collection: &str,
        override_existing: bool,
    ) -> Result<IngestReport> {
        let profile = self.registry.profile(subject)?;
        let parser = self.registry.record_parser(subject)?;
        let mut report = IngestReport::new(run_id, collection);

        // 1. Catalog
        let catalog = self.catalog.fetch(profile.data_type).await?;
        info!("Catalog lists {} files for {}", catalog.len(), profile.data_type);

        // 2. Resolve patient files
        let resolver = PatientFileResolver::new(self.settings.resolver_filter(profile));
        let mut patient_files = resolver.resolve(&catalog, base_dir);
        info!("Resolved files for {} patients", patient_files.len());

        // 3. Rebuild or resume
        if override_existing {
            store.drop_collection(collection)?;
            record(
                store,
                run_id,
                AuditEventType::CollectionDropped,
                collection,
                None,
                json!({}),
            )?;
        } else {
            report.skipped_existing = skip_existing(store, collection, &mut patient_files)?;
            for patient in &report.skipped_existing {
                record(
                    store,
                    run_id,
                    AuditEventType::PatientSkipped,
                    collection,
                    Some(patient.clone()),
                    json!({ "reason": "already stored" }),
                )?;
            }
            if !report.skipped_existing.is_empty() {
                info!(
                    "Skipping {} patients already stored in {}",
                    report.skipped_existing.len(),
                    collection
                );
            }
        }

        // 4. Per-patient insert
        let total = patient_files.len();
        for (idx, (patient, file)) in patient_files.iter().enumerate() {
            debug!("[{}/{}] {} <- {:?}", idx + 1, total, patient, file.path);

            if !file.path.is_file() {
                let missing = PipelineError::MissingFile {
                    patient: patient.clone(),
                    path: file.path.clone(),
                };
                warn!("{}", missing);
                record(
                    store,
                    run_id,
                    AuditEventType::FileMissing,
                    collection,
                    Some(patient.clone()),
                    json!({ "path": file.path.display().to_string() }),
                )?;
                report.missing_files.push((patient.clone(), file.path.clone()));
                continue;
            }

            let records = match parser.parse(&file.path, patient, Some(&file.file_id)) {
                Ok(records) => records,
                Err(e) if e.is_patient_scoped() => {
                    warn!("Skipping patient {}: {}", patient, e);
                    record(
                        store,
                        run_id,
                        AuditEventType::FileMalformed,
                        collection,
                        Some(patient.clone()),
                        json!({ "error": e.to_string() }),
                    )?;
                    report.malformed_files.push((patient.clone(), e.to_string()));
                    continue;
                }
                Err(e) => return Err(e),
            };

            let inserted = store.insert_many(collection, &records)?;
            record(
                store,
                run_id,
                AuditEventType::PatientInserted,
                collection,
                Some(patient.clone()),
                json!({ "records": inserted, "sample": file.file_id }),
            )?;
            report.inserted_patients.push(patient.clone());
            report.records_inserted += inserted;
        }

        // 5. Indexes, once per run
        store.create_indexes(collection, &MEASUREMENT_INDEXES)?;
        record(
            store,
            run_id,
            AuditEventType::IndexesCreated,
            collection,
            None,
            json!({ "indexes": MEASUREMENT_INDEXES.len() }),
        )?;

        Ok(report)
    }
}

/// Remove already-stored patients from the map, returning them
fn skip_existing(
    store: &dyn DocumentStore,
    collection: &str,
    patient_files: &mut PatientFileMap,
) -> Result<Vec<String>> {
    let existing = store.distinct(collection, StoreField::Patient)?;
    Ok(existing
        .into_iter()
        .filter(|patient| patient_files.remove(patient).is_some())
        .collect())
}

fn record(
    store: &mut dyn DocumentStore,
    run_id: Uuid,
    event_type: AuditEventType,
    collection: &str,
    resource: Option<String>,
    details: serde_json::Value,
) -> Result<()> {
    store.record_event(&AuditEvent::new(run_id, event_type, collection, resource, details))
}
