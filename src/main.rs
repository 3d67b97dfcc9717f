// ==============================================================================
// main.rs - Omics Pipeline Entry Point
// ==============================================================================
// Description: CLI for collection ingestion, shard variance and reports
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omics_pipeline::catalog::{CatalogSource, FileCatalog, GdcCatalogClient, RetryingCatalog};
use omics_pipeline::config::{Settings, SubjectRegistry};
use omics_pipeline::fetch::DataFetcher;
use omics_pipeline::ingest::IngestionPipeline;
use omics_pipeline::models::SubjectType;
use omics_pipeline::parsers::AllowList;
use omics_pipeline::report::{FeatureDistribution, ReportPipeline, VarianceDescription};
use omics_pipeline::stats::ShardAccumulation;
use omics_pipeline::store::SqliteDocumentStore;
use omics_pipeline::variance::{
    NamesSource, StreamingVarianceAggregator, VarianceTable, VarianceTableBuilder,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one subject's files into a store collection
    Ingest {
        /// Subject type (mRNA, miRNA or DNAm)
        #[arg(short, long)]
        subject: SubjectType,

        /// Directory holding <file_id>/<file_name> downloads
        #[arg(short, long)]
        base_dir: PathBuf,

        /// Document store database
        #[arg(long, env = "OMICS_STORE", default_value = "omics.db")]
        store: PathBuf,

        /// Collection name (defaults to the subject code)
        #[arg(short, long)]
        collection: Option<String>,

        /// Drop and rebuild the collection instead of resuming
        #[arg(long = "override")]
        override_existing: bool,

        /// Read the catalog from an exported TSV instead of the remote service
        #[arg(long)]
        catalog_file: Option<PathBuf>,

        /// Methylation probe allow-list (one probe per line)
        #[arg(long, env = "OMICS_ALLOW_LIST")]
        allow_list: Option<PathBuf>,
    },

    /// Per-feature variance over a directory of shard files
    ComputeVariance {
        #[arg(short, long)]
        subject: SubjectType,

        #[arg(short, long)]
        base_dir: PathBuf,

        /// Shard file extension (e.g. tsv, .txt, *.tsv.gz)
        #[arg(short, long)]
        extension: String,

        /// Write the variance artifact here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// accumulate or overwrite-legacy (defaults to OMICS_SHARD_ACCUMULATION)
        #[arg(long)]
        accumulation: Option<ShardAccumulation>,

        #[arg(long, env = "OMICS_ALLOW_LIST")]
        allow_list: Option<PathBuf>,
    },

    /// Sample variance per feature of a stored collection
    VarianceTable {
        #[arg(long, env = "OMICS_STORE", default_value = "omics.db")]
        store: PathBuf,

        #[arg(short, long)]
        collection: String,

        #[arg(short, long)]
        output: PathBuf,

        /// Recompute even if the output already exists
        #[arg(long = "override")]
        override_existing: bool,

        /// Feature names (list or earlier variance artifact) instead of every stored name
        #[arg(long)]
        names_file: Option<PathBuf>,
    },

    /// Print variance and distribution reports for a collection
    Describe {
        #[arg(long, env = "OMICS_STORE", default_value = "omics.db")]
        store: PathBuf,

        #[arg(short, long)]
        collection: String,

        /// Limit the per-feature distribution table
        #[arg(long, default_value = "50")]
        max_features: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omics_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let settings = Settings::from_env().context("Invalid OMICS_* configuration")?;

    match args.command {
        Command::Ingest {
            subject,
            base_dir,
            store,
            collection,
            override_existing,
            catalog_file,
            allow_list,
        } => {
            let registry = build_registry(allow_list.as_ref())?;
            let collection = match collection {
                Some(name) => name,
                None => registry.profile(subject)?.default_collection().to_string(),
            };

            let catalog: Box<dyn CatalogSource> = match catalog_file {
                Some(path) => Box::new(FileCatalog::new(path)),
                None => Box::new(RetryingCatalog::new(
                    GdcCatalogClient::new(
                        settings.catalog_endpoint.clone(),
                        settings.catalog_page_size,
                        settings.catalog_timeout,
                    )?,
                    settings.catalog_retries,
                    Duration::from_secs(2),
                )),
            };

            let mut store = SqliteDocumentStore::open(&store)
                .with_context(|| format!("Failed to open store {:?}", store))?;

            let pipeline = IngestionPipeline::new(&registry, catalog.as_ref(), &settings);
            let report = pipeline
                .run(subject, &base_dir, &mut store, &collection, override_existing)
                .await
                .with_context(|| format!("Ingestion of {} into {} failed", subject, collection))?;

            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::ComputeVariance {
            subject,
            base_dir,
            extension,
            output,
            accumulation,
            allow_list,
        } => {
            let registry = build_registry(allow_list.as_ref())?;
            let accumulation = accumulation.unwrap_or(settings.shard_accumulation);

            let aggregator = StreamingVarianceAggregator::new(&registry, accumulation);
            let variances = aggregator
                .aggregate(&base_dir, &extension, subject)
                .with_context(|| format!("Variance aggregation over {:?} failed", base_dir))?;

            let table =
                VarianceTable::from_variances(format!("shards:{}", base_dir.display()), variances);
            info!(
                "{} features, {} with defined variance",
                table.variances.len(),
                table.summary.count
            );

            match output {
                Some(path) => table.save(&path)?,
                None => println!("{}", serde_json::to_string_pretty(&table)?),
            }
        }

        Command::VarianceTable {
            store,
            collection,
            output,
            override_existing,
            names_file,
        } => {
            let store = SqliteDocumentStore::open(&store)
                .with_context(|| format!("Failed to open store {:?}", store))?;
            let names = names_file.map(NamesSource::File).unwrap_or(NamesSource::Distinct);

            let mut builder = VarianceTableBuilder::new(&store, settings.query_cache_capacity);
            let table = builder
                .build(&collection, &names, &output, override_existing)
                .with_context(|| format!("Variance table for {} failed", collection))?;

            println!("{}", serde_json::to_string_pretty(&table.summary)?);
        }

        Command::Describe {
            store,
            collection,
            max_features,
        } => {
            let store = SqliteDocumentStore::open(&store)
                .with_context(|| format!("Failed to open store {:?}", store))?;
            let mut fetcher = DataFetcher::new(&store, settings.query_cache_capacity);

            let report = ReportPipeline::new()
                .with_step(VarianceDescription)
                .with_step(FeatureDistribution {
                    max_features: Some(max_features),
                })
                .render(&mut fetcher, &collection)?;

            print!("{}", report);
        }
    }

    Ok(())
}

fn build_registry(allow_list: Option<&PathBuf>) -> Result<SubjectRegistry> {
    let registry = SubjectRegistry::new();
    match allow_list {
        Some(path) => {
            let allow_list = AllowList::from_file(path)
                .with_context(|| format!("Failed to load allow-list {:?}", path))?;
            info!("Loaded {} allowed features from {:?}", allow_list.len(), path);
            Ok(registry.with_methylation_allow_list(allow_list))
        }
        None => Ok(registry),
    }
}
