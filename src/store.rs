// ==============================================================================
// store.rs - Measurement Document Store
// ==============================================================================
// Description: Collection-per-subject store for measurement records (SQLite)
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================
// Each collection is one table:
//   id INTEGER PRIMARY KEY, name TEXT, value REAL NULL, patient TEXT,
//   sample TEXT NULL, metadata TEXT NULL (JSON object)
// ==============================================================================

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::audit::AuditEvent;
use crate::error::Result;
use crate::models::MeasurementRecord;
use crate::validator::validate_collection_name;

/// Indexed document fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreField {
    Name,
    Patient,
    Sample,
}

impl StoreField {
    pub fn column(&self) -> &'static str {
        match self {
            StoreField::Name => "name",
            StoreField::Patient => "patient",
            StoreField::Sample => "sample",
        }
    }
}

/// Secondary indexes every measurement collection carries
pub const MEASUREMENT_INDEXES: [&[StoreField]; 6] = [
    &[StoreField::Name],
    &[StoreField::Patient],
    &[StoreField::Sample],
    &[StoreField::Patient, StoreField::Name],
    &[StoreField::Sample, StoreField::Name],
    &[StoreField::Sample, StoreField::Patient],
];

/// Operations the pipeline needs from a document store
pub trait DocumentStore {
    /// Remove a collection and its indexes; missing collections are fine
    fn drop_collection(&mut self, collection: &str) -> Result<()>;

    /// Sorted distinct non-null values of a field
    fn distinct(&self, collection: &str, field: StoreField) -> Result<Vec<String>>;

    fn find_by_name(&self, collection: &str, name: &str) -> Result<Vec<MeasurementRecord>>;

    /// Values of every record with the given name (nulls included)
    fn find_values(&self, collection: &str, name: &str) -> Result<Vec<Option<f64>>>;

    /// Insert all records or none of them
    fn insert_many(&mut self, collection: &str, records: &[MeasurementRecord]) -> Result<usize>;

    /// Create indexes if absent
    fn create_indexes(&mut self, collection: &str, indexes: &[&[StoreField]]) -> Result<()>;

    fn count(&self, collection: &str) -> Result<u64>;

    fn record_event(&mut self, event: &AuditEvent) -> Result<()>;
}

/// SQLite-backed document store
pub struct SqliteDocumentStore {
    conn: Connection,
}

impl SqliteDocumentStore {
    /// Open (or create) a store database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        info!("Opened document store: {:?}", path.as_ref());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ingest_audit (
                id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                event_type TEXT NOT NULL,
                collection TEXT NOT NULL,
                resource TEXT,
                details TEXT NOT NULL,
                severity TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self { conn })
    }

    fn collection_exists(&self, collection: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn ensure_collection(&self, collection: &str) -> Result<()> {
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    value REAL,
                    patient TEXT NOT NULL,
                    sample TEXT,
                    metadata TEXT
                )",
                collection
            ),
            [],
        )?;
        Ok(())
    }

    /// Names of the indexes on a collection
    pub fn index_names(&self, collection: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 ORDER BY name",
        )?;
        let names = stmt
            .query_map(params![collection], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Audit event types and resources recorded for a collection, oldest first
    pub fn audit_trail(&self, collection: &str) -> Result<Vec<(String, Option<String>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_type, resource FROM ingest_audit
             WHERE collection = ?1 ORDER BY timestamp, rowid",
        )?;
        let events = stmt
            .query_map(params![collection], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn drop_collection(&mut self, collection: &str) -> Result<()> {
        validate_collection_name(collection)?;
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS \"{}\"", collection), [])?;
        info!("Dropped collection {}", collection);
        Ok(())
    }

    fn distinct(&self, collection: &str, field: StoreField) -> Result<Vec<String>> {
        validate_collection_name(collection)?;
        if !self.collection_exists(collection)? {
            return Ok(Vec::new());
        }

        let column = field.column();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT {col} FROM \"{table}\" WHERE {col} IS NOT NULL ORDER BY {col}",
            col = column,
            table = collection
        ))?;
        let values = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        debug!("{} distinct {} values in {}", values.len(), column, collection);
        Ok(values)
    }

    fn find_by_name(&self, collection: &str, name: &str) -> Result<Vec<MeasurementRecord>> {
        validate_collection_name(collection)?;
        if !self.collection_exists(collection)? {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT name, value, patient, sample, metadata FROM \"{}\" WHERE name = ?1 ORDER BY id",
            collection
        ))?;

        let records = stmt
            .query_map(params![name], |row| {
                let metadata_json: Option<String> = row.get(4)?;
                let metadata = match metadata_json {
                    Some(json) => serde_json::from_str::<HashMap<String, String>>(&json)
                        .map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                4,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?,
                    None => HashMap::new(),
                };

                Ok(MeasurementRecord {
                    name: row.get(0)?,
                    value: row.get(1)?,
                    patient: row.get(2)?,
                    sample: row.get(3)?,
                    metadata,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn find_values(&self, collection: &str, name: &str) -> Result<Vec<Option<f64>>> {
        validate_collection_name(collection)?;
        if !self.collection_exists(collection)? {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT value FROM \"{}\" WHERE name = ?1 ORDER BY id",
            collection
        ))?;
        let values = stmt
            .query_map(params![name], |row| row.get(0))?
            .collect::<std::result::Result<Vec<Option<f64>>, _>>()?;
        Ok(values)
    }

    fn insert_many(&mut self, collection: &str, records: &[MeasurementRecord]) -> Result<usize> {
        validate_collection_name(collection)?;
        self.ensure_collection(collection)?;

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO \"{}\" (name, value, patient, sample, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                collection
            ))?;

            for record in records {
                let metadata = if record.metadata.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&record.metadata)?)
                };

                stmt.execute(params![
                    record.name,
                    record.value,
                    record.patient,
                    record.sample,
                    metadata,
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    fn create_indexes(&mut self, collection: &str, indexes: &[&[StoreField]]) -> Result<()> {
        validate_collection_name(collection)?;
        self.ensure_collection(collection)?;

        let tx = self.conn.transaction()?;
        for fields in indexes {
            let columns: Vec<&str> = fields.iter().map(StoreField::column).collect();
            tx.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS \"idx_{table}_{suffix}\" ON \"{table}\" ({columns})",
                    table = collection,
                    suffix = columns.join("_"),
                    columns = columns.join(", ")
                ),
                [],
            )?;
        }
        tx.commit()?;

        info!("Ensured {} indexes on {}", indexes.len(), collection);
        Ok(())
    }

    fn count(&self, collection: &str) -> Result<u64> {
        validate_collection_name(collection)?;
        if !self.collection_exists(collection)? {
            return Ok(0);
        }

        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", collection),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn record_event(&mut self, event: &AuditEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO ingest_audit (
                id, run_id, timestamp, event_type, collection,
                resource, details, severity
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.id.to_string(),
                event.run_id.to_string(),
                event.timestamp.to_rfc3339(),
                event.event_type.as_str(),
                event.collection,
                event.resource,
                event.details.to_string(),
                event.severity.as_str(),
            ],
        )?;
        Ok(())
    }
}
