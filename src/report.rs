// ==============================================================================
// report.rs - Collection Reports
// ==============================================================================
// Description: Text reports over a collection, built from independent steps
// Author: Matt Barham
// Created: 2025-11-20
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use tracing::debug;

use crate::error::Result;
use crate::fetch::DataFetcher;
use crate::stats::{sample_variance, Summary};

/// One section of a report
pub trait ReportStep {
    fn title(&self) -> &str;

    /// Append this section's body to `out`
    fn render(&self, fetcher: &mut DataFetcher<'_>, collection: &str, out: &mut String)
        -> Result<()>;
}

/// Describes the distribution of per-feature variances
pub struct VarianceDescription;

impl ReportStep for VarianceDescription {
    fn title(&self) -> &str {
        "Variance description"
    }

    fn render(
        &self,
        fetcher: &mut DataFetcher<'_>,
        collection: &str,
        out: &mut String,
    ) -> Result<()> {
        let names = fetcher.names(collection)?;
        let mut variances = Vec::with_capacity(names.len());
        for name in names.iter() {
            if let Some(variance) = sample_variance(&fetcher.values(collection, name)?) {
                variances.push(variance);
            }
        }

        let summary = Summary::describe(variances);
        let rows = [
            ("count", Some(summary.count as f64)),
            ("mean", summary.mean),
            ("std", summary.std),
            ("min", summary.min),
            ("25%", summary.q25),
            ("50%", summary.median),
            ("75%", summary.q75),
            ("max", summary.max),
        ];
        for (label, value) in rows {
            out.push_str(&format!("{:<8}{:>16}\n", label, format_value(value)));
        }
        Ok(())
    }
}

/// Five-number summary of stored values per feature
pub struct FeatureDistribution {
    /// Render at most this many features (in name order)
    pub max_features: Option<usize>,
}

impl ReportStep for FeatureDistribution {
    fn title(&self) -> &str {
        "Feature distribution"
    }

    fn render(
        &self,
        fetcher: &mut DataFetcher<'_>,
        collection: &str,
        out: &mut String,
    ) -> Result<()> {
        let names = fetcher.names(collection)?;
        let limit = self.max_features.unwrap_or(names.len());

        out.push_str(&format!(
            "{:<24}{:>8}{:>14}{:>14}{:>14}{:>14}{:>14}\n",
            "name", "count", "min", "25%", "50%", "75%", "max"
        ));
        for name in names.iter().take(limit) {
            let summary = Summary::describe(fetcher.values(collection, name)?.iter().copied());
            out.push_str(&format!(
                "{:<24}{:>8}{:>14}{:>14}{:>14}{:>14}{:>14}\n",
                name,
                summary.count,
                format_value(summary.min),
                format_value(summary.q25),
                format_value(summary.median),
                format_value(summary.q75),
                format_value(summary.max),
            ));
        }

        if names.len() > limit {
            out.push_str(&format!("... {} more features\n", names.len() - limit));
        }
        Ok(())
    }
}

/// Ordered report steps sharing one data fetcher
#[derive(Default)]
pub struct ReportPipeline {
    steps: Vec<Box<dyn ReportStep>>,
}

impl ReportPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step(mut self, step: impl ReportStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn render(&self, fetcher: &mut DataFetcher<'_>, collection: &str) -> Result<String> {
        let mut out = String::new();
        for step in &self.steps {
            debug!("Rendering '{}' for {}", step.title(), collection);
            out.push_str(&format!("== {} ({}) ==\n", step.title(), collection));
            step.render(fetcher, collection, &mut out)?;
            out.push('\n');
        }
        Ok(out)
    }
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.6}", v),
        None => "-".to_string(),
    }
}
