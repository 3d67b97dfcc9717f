// ==============================================================================
// config.rs - Pipeline Configuration
// ==============================================================================
// Description: Runtime settings and the subject registry built at startup
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::models::SubjectType;
use crate::parsers::{AllowList, RecordParser, VarianceShardParser};
use crate::resolver::ResolverFilter;
use crate::stats::ShardAccumulation;

pub const DEFAULT_CATALOG_ENDPOINT: &str = "https://api.gdc.cancer.gov/files";
pub const DEFAULT_PROJECT_PREFIX: &str = "TCGA";
pub const PRIMARY_TUMOR: &str = "Primary Tumor";
pub const DEFAULT_CATALOG_PAGE_SIZE: u32 = 200_000;
pub const DEFAULT_QUERY_CACHE_CAPACITY: usize = 256;

/// Runtime settings (environment overridable)
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub catalog_endpoint: String,
    pub project_prefix: String,
    pub sample_type: String,
    pub catalog_page_size: u32,
    pub catalog_timeout: Duration,
    pub catalog_retries: u32,
    pub query_cache_capacity: usize,
    pub shard_accumulation: ShardAccumulation,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_endpoint: DEFAULT_CATALOG_ENDPOINT.to_string(),
            project_prefix: DEFAULT_PROJECT_PREFIX.to_string(),
            sample_type: PRIMARY_TUMOR.to_string(),
            catalog_page_size: DEFAULT_CATALOG_PAGE_SIZE,
            catalog_timeout: Duration::from_secs(120),
            catalog_retries: 3,
            query_cache_capacity: DEFAULT_QUERY_CACHE_CAPACITY,
            shard_accumulation: ShardAccumulation::Accumulate,
        }
    }
}

impl Settings {
    /// Defaults overridden by `OMICS_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(endpoint) = lookup("OMICS_CATALOG_ENDPOINT") {
            settings.catalog_endpoint = endpoint;
        }
        if let Some(prefix) = lookup("OMICS_PROJECT_PREFIX") {
            settings.project_prefix = prefix;
        }
        if let Some(sample_type) = lookup("OMICS_SAMPLE_TYPE") {
            settings.sample_type = sample_type;
        }
        if let Some(size) = lookup("OMICS_CATALOG_PAGE_SIZE") {
            settings.catalog_page_size = parse_number("OMICS_CATALOG_PAGE_SIZE", &size)?;
        }
        if let Some(secs) = lookup("OMICS_CATALOG_TIMEOUT_SECS") {
            settings.catalog_timeout =
                Duration::from_secs(parse_number("OMICS_CATALOG_TIMEOUT_SECS", &secs)?);
        }
        if let Some(retries) = lookup("OMICS_CATALOG_RETRIES") {
            settings.catalog_retries = parse_number("OMICS_CATALOG_RETRIES", &retries)?;
        }
        if let Some(capacity) = lookup("OMICS_QUERY_CACHE_CAPACITY") {
            settings.query_cache_capacity = parse_number("OMICS_QUERY_CACHE_CAPACITY", &capacity)?;
        }
        if let Some(mode) = lookup("OMICS_SHARD_ACCUMULATION") {
            settings.shard_accumulation = mode.parse().map_err(PipelineError::InvalidConfig)?;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.catalog_endpoint.starts_with("http://") && !self.catalog_endpoint.starts_with("https://") {
            return Err(PipelineError::InvalidConfig(format!(
                "catalog endpoint must be an http(s) URL: {}",
                self.catalog_endpoint
            )));
        }
        if self.catalog_page_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "catalog page size must be positive".to_string(),
            ));
        }
        if self.query_cache_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "query cache capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn resolver_filter(&self, subject: &SubjectProfile) -> ResolverFilter {
        ResolverFilter {
            project_prefix: self.project_prefix.clone(),
            file_suffix: subject.file_suffix.to_string(),
            sample_type: self.sample_type.clone(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        PipelineError::InvalidConfig(format!("{} must be a number, got '{}'", key, value))
    })
}

/// Static description of one subject type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectProfile {
    pub subject: SubjectType,
    /// Catalog `experimental_strategy` value
    pub data_type: &'static str,
    /// Suffix identifying this subject's files in the catalog
    pub file_suffix: &'static str,
}

impl SubjectProfile {
    pub fn default_collection(&self) -> &'static str {
        self.subject.as_str()
    }
}

/// Subject type -> profile and parser configuration
///
/// Built once at startup and handed to the pipeline by reference.
#[derive(Debug, Clone)]
pub struct SubjectRegistry {
    profiles: HashMap<SubjectType, SubjectProfile>,
    methylation_allow_list: Option<Arc<AllowList>>,
}

impl Default for SubjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubjectRegistry {
    pub fn new() -> Self {
        let profiles = [
            SubjectProfile {
                subject: SubjectType::Expression,
                data_type: "RNA-Seq",
                file_suffix: "rna_seq.augmented_star_gene_counts.tsv",
            },
            SubjectProfile {
                subject: SubjectType::MicroRna,
                data_type: "miRNA-Seq",
                file_suffix: "mirbase21.mirnas.quantification.txt",
            },
            SubjectProfile {
                subject: SubjectType::Methylation,
                data_type: "Methylation Array",
                file_suffix: "methylation_array.sesame.level3betas.txt",
            },
        ]
        .into_iter()
        .map(|profile| (profile.subject, profile))
        .collect();

        Self {
            profiles,
            methylation_allow_list: None,
        }
    }

    pub fn with_methylation_allow_list(mut self, allow_list: AllowList) -> Self {
        self.methylation_allow_list = Some(Arc::new(allow_list));
        self
    }

    pub fn profile(&self, subject: SubjectType) -> Result<&SubjectProfile> {
        self.profiles.get(&subject).ok_or_else(|| {
            PipelineError::InvalidConfig(format!("no profile registered for subject {}", subject))
        })
    }

    /// Record parser for a subject; methylation needs an allow-list
    pub fn record_parser(&self, subject: SubjectType) -> Result<RecordParser> {
        match subject {
            SubjectType::Expression => Ok(RecordParser::Expression),
            SubjectType::MicroRna => Ok(RecordParser::MicroRna),
            SubjectType::Methylation => self
                .methylation_allow_list
                .as_ref()
                .map(|allow_list| RecordParser::Methylation {
                    allow_list: Arc::clone(allow_list),
                })
                .ok_or_else(|| {
                    PipelineError::InvalidConfig(
                        "methylation parsing requires an allow-list".to_string(),
                    )
                }),
        }
    }

    pub fn shard_parser(
        &self,
        subject: SubjectType,
        accumulation: ShardAccumulation,
    ) -> Result<VarianceShardParser> {
        Ok(VarianceShardParser::new(self.record_parser(subject)?, accumulation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.sample_type, "Primary Tumor");
        assert_eq!(settings.project_prefix, "TCGA");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OMICS_PROJECT_PREFIX", "CPTAC"),
            ("OMICS_QUERY_CACHE_CAPACITY", "16"),
            ("OMICS_SHARD_ACCUMULATION", "overwrite-legacy"),
        ]
        .into_iter()
        .collect();

        let settings = Settings::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(settings.project_prefix, "CPTAC");
        assert_eq!(settings.query_cache_capacity, 16);
        assert_eq!(settings.shard_accumulation, ShardAccumulation::OverwriteLegacy);
    }

    #[test]
    fn test_invalid_env_values() {
        let bad_number = Settings::from_lookup(|key| {
            (key == "OMICS_CATALOG_RETRIES").then(|| "many".to_string())
        });
        assert!(matches!(bad_number, Err(PipelineError::InvalidConfig(_))));

        let bad_url = Settings::from_lookup(|key| {
            (key == "OMICS_CATALOG_ENDPOINT").then(|| "ftp://gdc".to_string())
        });
        assert!(bad_url.is_err());
    }

    #[test]
    fn test_registry_profiles() {
        let registry = SubjectRegistry::new();
        let profile = registry.profile(SubjectType::MicroRna).unwrap();
        assert_eq!(profile.data_type, "miRNA-Seq");
        assert_eq!(profile.default_collection(), "miRNA");
        assert_eq!(
            Settings::default().resolver_filter(profile).file_suffix,
            "mirbase21.mirnas.quantification.txt"
        );
    }

    #[test]
    fn test_methylation_requires_allow_list() {
        let registry = SubjectRegistry::new();
        assert!(registry.record_parser(SubjectType::Expression).is_ok());
        assert!(registry.record_parser(SubjectType::Methylation).is_err());

        let registry = registry.with_methylation_allow_list(AllowList::new(["cg1"]));
        let parser = registry.record_parser(SubjectType::Methylation).unwrap();
        assert!(parser.admits("cg1"));
        assert!(!parser.admits("cg2"));
    }
}
