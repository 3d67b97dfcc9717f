// ==============================================================================
// table.rs - Store-Backed Variance Table
// ==============================================================================
// Description: Sample variance per stored feature, persisted as a JSON artifact
// Author: Matt Barham
// Created: 2025-11-19
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Artifact format:
//   { "generated_at": RFC 3339, "source": "...",
//     "variances": { "<feature>": <variance> | null, ... },
//     "summary": { "count", "mean", "std", "min", "q25", "median", "q75", "max" } }
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::fetch::DataFetcher;
use crate::stats::{sample_variance, Summary};
use crate::store::DocumentStore;
use crate::validator::parse_feature_list;
use crate::variance::FeatureVarianceMap;

/// Persisted per-feature variances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceTable {
    pub generated_at: DateTime<Utc>,
    /// Collection or shard directory the variances were computed from
    pub source: String,
    pub variances: FeatureVarianceMap,
    /// Distribution of the defined variances
    pub summary: Summary,
}

impl VarianceTable {
    pub fn from_variances(source: impl Into<String>, variances: FeatureVarianceMap) -> Self {
        let summary = Summary::describe(variances.values().flatten().copied());
        Self {
            generated_at: Utc::now(),
            source: source.into(),
            variances,
            summary,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }

        // Readers never see a half-written artifact
        let partial = partial_path(path);
        let file = File::create(&partial).map_err(|e| PipelineError::io(&partial, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush().map_err(|e| PipelineError::io(&partial, e))?;
        drop(writer);
        std::fs::rename(&partial, path).map_err(|e| PipelineError::io(path, e))?;

        info!("Wrote variance table ({} features) to {:?}", self.variances.len(), path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Features in name order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variances.keys().map(String::as_str)
    }
}

/// Sibling of `path` the artifact is written to before the final rename
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn looks_like_artifact(path: &Path, contents: &str) -> bool {
    contents.trim_start().starts_with('{')
        || path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

/// Where the feature names of a variance table come from
#[derive(Debug, Clone, PartialEq)]
pub enum NamesSource {
    /// Every distinct name stored in the collection
    Distinct,
    Explicit(Vec<String>),
    /// A previous variance artifact, or a plain list with one name per line
    File(PathBuf),
}

impl NamesSource {
    pub fn resolve(&self, fetcher: &mut DataFetcher<'_>, collection: &str) -> Result<Vec<String>> {
        match self {
            NamesSource::Distinct => Ok(fetcher.names(collection)?.to_vec()),
            NamesSource::Explicit(names) => Ok(names.clone()),
            NamesSource::File(path) => {
                let contents =
                    std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
                if looks_like_artifact(path, &contents) {
                    let table: VarianceTable = serde_json::from_str(&contents)?;
                    Ok(table.names().map(str::to_string).collect())
                } else {
                    Ok(parse_feature_list(&contents))
                }
            }
        }
    }
}

/// Builds (or reuses) the variance artifact of a collection
pub struct VarianceTableBuilder<'s> {
    fetcher: DataFetcher<'s>,
}

impl<'s> VarianceTableBuilder<'s> {
    pub fn new(store: &'s dyn DocumentStore, cache_capacity: usize) -> Self {
        Self::from_fetcher(DataFetcher::new(store, cache_capacity))
    }

    pub fn from_fetcher(fetcher: DataFetcher<'s>) -> Self {
        Self { fetcher }
    }

    /// Hand the warmed-up fetcher to report steps
    pub fn into_fetcher(self) -> DataFetcher<'s> {
        self.fetcher
    }

    /// Load `output_path` when it exists, otherwise compute and persist
    pub fn build(
        &mut self,
        collection: &str,
        names: &NamesSource,
        output_path: &Path,
        override_existing: bool,
    ) -> Result<VarianceTable> {
        if output_path.exists() && !override_existing {
            info!("Reusing variance table {:?}", output_path);
            return VarianceTable::load(output_path);
        }

        if override_existing {
            self.fetcher.invalidate(collection);
        }

        let names = names.resolve(&mut self.fetcher, collection)?;
        info!("Computing variance of {} features in {}", names.len(), collection);

        let mut variances = FeatureVarianceMap::new();
        for (idx, name) in names.iter().enumerate() {
            let values = self.fetcher.values(collection, name)?;
            variances.insert(name.clone(), sample_variance(&values));

            if (idx + 1) % 10_000 == 0 {
                debug!("{} / {} features", idx + 1, names.len());
            }
        }

        let table = VarianceTable::from_variances(format!("collection:{}", collection), variances);
        table.save(output_path)?;
        Ok(table)
    }
}
