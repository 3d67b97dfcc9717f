// ==============================================================================
// validator.rs - Input Validation
// ==============================================================================
// Description: Validates collection names, shard extensions and allow-lists
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-10-18
// Version: 2.0.0
// Security: Allowlist-only identifiers (collection names become table names)
// ==============================================================================

use crate::error::{PipelineError, Result};

const MAX_COLLECTION_NAME_LEN: usize = 63;

/// Tables owned by the store itself
const RESERVED_COLLECTIONS: &[&str] = &["ingest_audit"];

/// Validate a collection name before it is interpolated into SQL
///
/// Accepts ASCII letters, digits and underscores, starting with a letter.
pub fn validate_collection_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "collection name must not be empty".to_string(),
        ));
    }

    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(PipelineError::InvalidConfig(format!(
            "collection name too long: {} characters (max: {})",
            name.len(),
            MAX_COLLECTION_NAME_LEN
        )));
    }

    let mut chars = name.chars();
    let starts_with_letter = chars.next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false);
    if !starts_with_letter || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(PipelineError::InvalidConfig(format!(
            "invalid collection name '{}'",
            name
        )));
    }

    let lowered = name.to_ascii_lowercase();
    if lowered.starts_with("sqlite_") || RESERVED_COLLECTIONS.contains(&lowered.as_str()) {
        return Err(PipelineError::InvalidConfig(format!(
            "collection name '{}' is reserved",
            name
        )));
    }

    Ok(())
}

/// Normalize a shard extension so `tsv`, `.tsv` and `*.tsv` all match `.tsv`
pub fn normalize_extension(extension: &str) -> Result<String> {
    let trimmed = extension.trim().trim_start_matches('*').trim_start_matches('.');

    if trimmed.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "shard file extension must not be empty".to_string(),
        ));
    }

    if trimmed.contains(['/', '\\', '\0']) {
        return Err(PipelineError::InvalidConfig(format!(
            "invalid shard file extension '{}'",
            extension
        )));
    }

    Ok(format!(".{}", trimmed))
}

/// Parse a feature allow-list: one identifier per line, `#` comments allowed
pub fn parse_feature_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.split('\t').next().unwrap_or(line).trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_names() {
        assert!(validate_collection_name("mRNA").is_ok());
        assert!(validate_collection_name("DNAm_2024").is_ok());

        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("1mRNA").is_err());
        assert!(validate_collection_name("mRNA; DROP TABLE x").is_err());
        assert!(validate_collection_name("sqlite_master").is_err());
        assert!(validate_collection_name("ingest_audit").is_err());
        assert!(validate_collection_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("tsv").unwrap(), ".tsv");
        assert_eq!(normalize_extension(".tsv").unwrap(), ".tsv");
        assert_eq!(normalize_extension("*.txt.gz").unwrap(), ".txt.gz");
        assert!(normalize_extension("").is_err());
        assert!(normalize_extension("../x").is_err());
    }

    #[test]
    fn test_parse_feature_list() {
        let contents = "# probes\ncg00000029\n\n  cg00000108  \ncg00000109\textra\n";
        assert_eq!(
            parse_feature_list(contents),
            vec!["cg00000029", "cg00000108", "cg00000109"]
        );
    }
}
