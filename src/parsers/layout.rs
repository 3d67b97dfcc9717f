// ==============================================================================
// layout.rs - Tab-Delimited Column Layouts
// ==============================================================================
// Description: Data-driven column layouts and row reader for omics TSV files
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================
// Layouts per subject (0-based indices, negative counts from the row end):
//
//   expression   header line 1, skip 6, name 1, value -1, metadata 0,2,4,5,6,7
//   micro-RNA    header line 0, skip 6, name 0, value -2, metadata 1,-1
//   methylation  no header,     skip 6, name 0, value  1, no metadata
// ==============================================================================

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Column position counted from the start or the end of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Start(usize),
    /// `End(1)` is the last column
    End(usize),
}

impl Column {
    pub fn resolve(&self, len: usize) -> Option<usize> {
        match *self {
            Column::Start(idx) if idx < len => Some(idx),
            Column::End(back) if back >= 1 && back <= len => Some(len - back),
            _ => None,
        }
    }
}

/// Fixed column layout of one subject's measurement files
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    /// Line holding column names, if the format has one
    pub header_line: Option<usize>,
    /// Number of leading lines that are not data rows
    pub skip_lines: usize,
    pub name: Column,
    pub value: Column,
    pub metadata: &'static [Column],
    /// Tokens that mean "not available" (compared case-insensitively)
    pub missing_tokens: &'static [&'static str],
}

pub const EXPRESSION_LAYOUT: ColumnLayout = ColumnLayout {
    header_line: Some(1),
    skip_lines: 6,
    name: Column::Start(1),
    value: Column::End(1),
    metadata: &[
        Column::Start(0),
        Column::Start(2),
        Column::Start(4),
        Column::Start(5),
        Column::Start(6),
        Column::Start(7),
    ],
    missing_tokens: &[],
};

pub const MICRO_RNA_LAYOUT: ColumnLayout = ColumnLayout {
    header_line: Some(0),
    skip_lines: 6,
    name: Column::Start(0),
    value: Column::End(2),
    metadata: &[Column::Start(1), Column::End(1)],
    missing_tokens: &[],
};

pub const METHYLATION_LAYOUT: ColumnLayout = ColumnLayout {
    header_line: None,
    skip_lines: 6,
    name: Column::Start(0),
    value: Column::Start(1),
    metadata: &[],
    missing_tokens: &["NA", ""],
};

/// One data row handed to a visitor
pub struct Row<'a> {
    /// 1-based line number in the file
    pub line: usize,
    pub fields: &'a [&'a str],
    pub header: &'a [String],
}

impl<'a> Row<'a> {
    pub fn get(&self, column: Column) -> Option<&'a str> {
        column.resolve(self.fields.len()).map(|idx| self.fields[idx])
    }

    /// Name of a column according to the header line
    pub fn column_name(&self, column: Column) -> String {
        column
            .resolve(self.fields.len())
            .and_then(|idx| self.header.get(idx))
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| match column {
                Column::Start(idx) => format!("column_{}", idx),
                Column::End(back) => format!("column_end_{}", back),
            })
    }
}

impl ColumnLayout {
    /// Parse a value token; missing sentinels become `None`
    pub fn parse_value(&self, token: &str, path: &Path, line: usize) -> Result<Option<f64>> {
        let token = token.trim();

        if self
            .missing_tokens
            .iter()
            .any(|missing| missing.eq_ignore_ascii_case(token))
        {
            return Ok(None);
        }

        match token.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            _ => Err(PipelineError::MalformedRecord {
                path: path.to_path_buf(),
                line,
                details: format!("invalid value '{}'", token),
            }),
        }
    }

    /// Walk the data rows of a file, tab-split, after the skipped preamble
    ///
    /// Files ending in `.gz` are decompressed on the fly. Blank lines are
    /// ignored. The first visitor error aborts the walk.
    pub fn visit_rows<F>(&self, path: &Path, mut visit: F) -> Result<()>
    where
        F: FnMut(Row<'_>) -> Result<()>,
    {
        let reader = open_text(path)?;
        let mut header: Vec<String> = Vec::new();

        for (idx, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| PipelineError::io(path, e))?;
            let line = line.trim_end_matches('\r');

            if Some(idx) == self.header_line {
                header = line.split('\t').map(str::to_string).collect();
            }

            if idx < self.skip_lines || line.trim().is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            visit(Row {
                line: idx + 1,
                fields: &fields,
                header: &header,
            })?;
        }

        Ok(())
    }
}

/// Open a plain or gzip-compressed text file
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;

    let is_gzip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false);

    let inner: Box<dyn Read> = if is_gzip {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };

    Ok(Box::new(BufReader::new(inner)))
}
