// ==============================================================================
// lib.rs - Omics Pipeline Library
// ==============================================================================
// Description: Library interface for omics ingestion and variance modules
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

pub mod audit;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod models;
pub mod parsers;
pub mod report;
pub mod resolver;
pub mod stats;
pub mod store;
pub mod validator;
pub mod variance;

pub use error::{PipelineError, Result};
