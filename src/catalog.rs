// ==============================================================================
// catalog.rs - External File Catalog
// ==============================================================================
// Description: Fetches file metadata (GDC files endpoint) for a subject type
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2026-10-18
// Version: 1.1.0
// ==============================================================================
// Response format: TSV with header
//   file_name  id  cases.0.submitter_id  cases.0.samples.0.sample_type
//   cases.0.project.project_id  cases.0.project.primary_site
// ==============================================================================

use async_trait::async_trait;
use csv::ReaderBuilder;
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::models::CatalogRecord;

const CATALOG_FIELDS: &[&str] = &[
    "file_name",
    "cases.submitter_id",
    "cases.samples.sample_type",
    "cases.project.project_id",
    "cases.project.primary_site",
];

/// Source of catalog records for a data type
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self, data_type: &str) -> Result<Vec<CatalogRecord>>;
}

/// Parse a catalog TSV document
pub fn parse_catalog_tsv<R: Read>(reader: R) -> Result<Vec<CatalogRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for (idx, result) in reader.deserialize().enumerate() {
        let record: CatalogRecord = result.map_err(|e| {
            PipelineError::CatalogUnavailable(format!("invalid catalog row {}: {}", idx + 1, e))
        })?;
        records.push(record);
    }

    Ok(records)
}

/// HTTP client for the GDC `files` endpoint
pub struct GdcCatalogClient {
    client: reqwest::Client,
    endpoint: String,
    page_size: u32,
}

impl GdcCatalogClient {
    pub fn new(endpoint: impl Into<String>, page_size: u32, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::CatalogUnavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            page_size,
        })
    }

    /// Request body filtering files by experimental strategy
    pub fn request_body(&self, data_type: &str) -> serde_json::Value {
        json!({
            "filters": {
                "op": "and",
                "content": [
                    {
                        "op": "in",
                        "content": {
                            "field": "files.experimental_strategy",
                            "value": [data_type]
                        }
                    }
                ]
            },
            "fields": CATALOG_FIELDS.join(","),
            "format": "TSV",
            "size": self.page_size.to_string()
        })
    }
}

#[async_trait]
impl CatalogSource for GdcCatalogClient {
    async fn fetch(&self, data_type: &str) -> Result<Vec<CatalogRecord>> {
        info!("Requesting catalog for data type '{}' from {}", data_type, self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.request_body(data_type))
            .send()
            .await
            .map_err(|e| PipelineError::CatalogUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::CatalogUnavailable(format!(
                "catalog returned HTTP {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PipelineError::CatalogUnavailable(format!("failed to read body: {}", e)))?;

        let records = parse_catalog_tsv(body.as_ref())?;
        info!("Catalog returned {} file records", records.len());
        Ok(records)
    }
}

/// Catalog read from a previously exported TSV (offline runs)
pub struct FileCatalog {
    path: PathBuf,
}

impl FileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CatalogSource for FileCatalog {
    async fn fetch(&self, data_type: &str) -> Result<Vec<CatalogRecord>> {
        debug!("Reading catalog for '{}' from {:?}", data_type, self.path);

        let file = std::fs::File::open(&self.path).map_err(|e| {
            PipelineError::CatalogUnavailable(format!("cannot open {:?}: {}", self.path, e))
        })?;
        parse_catalog_tsv(file)
    }
}

/// Retries `CatalogUnavailable` with exponential backoff
pub struct RetryingCatalog<C> {
    inner: C,
    max_retries: u32,
    base_delay: Duration,
}

impl<C: CatalogSource> RetryingCatalog<C> {
    pub fn new(inner: C, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt + 1`, saturating on large counts
    fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[async_trait]
impl<C: CatalogSource> CatalogSource for RetryingCatalog<C> {
    async fn fetch(&self, data_type: &str) -> Result<Vec<CatalogRecord>> {
        let mut attempt = 0;
        loop {
            match self.inner.fetch(data_type).await {
                Err(PipelineError::CatalogUnavailable(reason)) if attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    attempt += 1;
                    warn!(
                        "Catalog unavailable ({}), retry {}/{} in {:?}",
                        reason, attempt, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    const CATALOG_TSV: &str = "\
file_name\tid\tcases.0.submitter_id\tcases.0.samples.0.sample_type\tcases.0.project.project_id\tcases.0.project.primary_site
a.rna_seq.augmented_star_gene_counts.tsv\tf-1\tTCGA-01\tPrimary Tumor\tTCGA-BRCA\tBreast
b.rna_seq.augmented_star_gene_counts.tsv\tf-2\tTCGA-02\tSolid Tissue Normal\tTCGA-BRCA\t
";

    #[test]
    fn test_parse_catalog_tsv() {
        let records = parse_catalog_tsv(CATALOG_TSV.as_bytes()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].file_id, "f-1");
        assert_eq!(records[0].submitter_id, "TCGA-01");
        assert_eq!(records[0].primary_site.as_deref(), Some("Breast"));
        assert_eq!(records[1].sample_type, "Solid Tissue Normal");
        assert_eq!(records[1].primary_site, None);
    }

    #[test]
    fn test_backoff_delay_saturates() {
        let catalog = RetryingCatalog::new(FileCatalog::new("unused.tsv"), 64, Duration::from_secs(2));

        assert_eq!(catalog.backoff_delay(0), Duration::from_secs(2));
        assert_eq!(catalog.backoff_delay(3), Duration::from_secs(16));
        assert_eq!(catalog.backoff_delay(32), Duration::from_secs(2) * u32::MAX);
        assert_eq!(catalog.backoff_delay(40), catalog.backoff_delay(32));
    }

    #[test]
    fn test_missing_column_is_catalog_error() {
        let tsv = "file_name\tid\nx\ty\n";
        assert!(matches!(
            parse_catalog_tsv(tsv.as_bytes()),
            Err(PipelineError::CatalogUnavailable(_))
        ));
    }

    #[test]
    fn test_request_body_filters_by_strategy() {
        let client =
            GdcCatalogClient::new("https://api.gdc.cancer.gov/files", 500, Duration::from_secs(5))
                .unwrap();
        let body = client.request_body("miRNA-Seq");

        assert_eq!(body["format"], "TSV");
        assert_eq!(body["size"], "500");
        assert_eq!(body["filters"]["content"][0]["content"]["value"][0], "miRNA-Seq");
        assert!(body["fields"].as_str().unwrap().contains("cases.submitter_id"));
    }

    #[tokio::test]
    async fn test_file_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.tsv");
        std::fs::write(&path, CATALOG_TSV).unwrap();

        let records = FileCatalog::new(&path).fetch("RNA-Seq").await.unwrap();
        assert_eq!(records.len(), 2);

        let missing = FileCatalog::new(dir.path().join("nope.tsv")).fetch("RNA-Seq").await;
        assert!(matches!(missing, Err(PipelineError::CatalogUnavailable(_))));
    }

    struct FlakyCatalog {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl CatalogSource for FlakyCatalog {
        async fn fetch(&self, _data_type: &str) -> Result<Vec<CatalogRecord>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(PipelineError::CatalogUnavailable("503".to_string()))
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let catalog = RetryingCatalog::new(
            FlakyCatalog { failures: 2, calls: AtomicU32::new(0) },
            3,
            Duration::from_millis(1),
        );
        assert!(catalog.fetch("RNA-Seq").await.is_ok());
        assert_eq!(catalog.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let catalog = RetryingCatalog::new(
            FlakyCatalog { failures: 10, calls: AtomicU32::new(0) },
            2,
            Duration::from_millis(1),
        );
        assert!(catalog.fetch("RNA-Seq").await.is_err());
        assert_eq!(catalog.inner.calls.load(Ordering::SeqCst), 3);
    }
}
