// ==============================================================================
// audit.rs - Audit Logging for Ingestion Runs
// ==============================================================================
// Description: Audit trail for ingestion runs, persisted next to the collections
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Run lifecycle
    RunStarted,
    RunCompleted,
    RunFailed,

    // Collection operations
    CollectionDropped,
    IndexesCreated,

    // Per-patient outcomes
    PatientInserted,
    PatientSkipped,
    FileMissing,
    FileMalformed,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::RunStarted => "run_started",
            AuditEventType::RunCompleted => "run_completed",
            AuditEventType::RunFailed => "run_failed",
            AuditEventType::CollectionDropped => "collection_dropped",
            AuditEventType::IndexesCreated => "indexes_created",
            AuditEventType::PatientInserted => "patient_inserted",
            AuditEventType::PatientSkipped => "patient_skipped",
            AuditEventType::FileMissing => "file_missing",
            AuditEventType::FileMalformed => "file_malformed",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

impl LogSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSeverity::Info => "info",
            LogSeverity::Warning => "warning",
            LogSeverity::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    /// Ingestion run this event belongs to
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub collection: String,
    /// Patient id, when the event is about one patient
    pub resource: Option<String>,
    pub details: serde_json::Value,
    pub severity: LogSeverity,
}

impl AuditEvent {
    pub fn new(
        run_id: Uuid,
        event_type: AuditEventType,
        collection: &str,
        resource: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        let severity = match event_type {
            AuditEventType::FileMissing | AuditEventType::CollectionDropped => LogSeverity::Warning,
            AuditEventType::FileMalformed | AuditEventType::RunFailed => LogSeverity::Error,
            _ => LogSeverity::Info,
        };

        Self {
            id: Uuid::new_v4(),
            run_id,
            timestamp: Utc::now(),
            event_type,
            collection: collection.to_string(),
            resource,
            details,
            severity,
        }
    }
}
