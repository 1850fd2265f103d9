//! @ai:module:intent Report generation for benchmark runs
//! @ai:module:layer infrastructure
//! @ai:module:public_api ReportGenerator, JsonReporter, MarkdownReporter, ChartGenerator

pub mod charts;
pub mod json_report;
pub mod markdown_report;

pub use charts::{ChartGenerator, ChartGeneratorTrait};
pub use json_report::{JsonReporter, JsonReporterTrait};
pub use markdown_report::{MarkdownReporter, MarkdownReporterTrait};

use crate::metrics::RunReport;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// @ai:intent Combined report generator
pub struct ReportGenerator {
    json: JsonReporter,
    markdown: MarkdownReporter,
    charts: ChartGenerator,
}

impl ReportGenerator {
    /// @ai:intent Create a new report generator
    /// @ai:effects pure
    pub fn new() -> Self {
        Self {
            json: JsonReporter::new(),
            markdown: MarkdownReporter::new(),
            charts: ChartGenerator::new(),
        }
    }

    /// @ai:intent Write results.json, results.md and the status chart; returns written paths
    /// @ai:effects fs:write
    pub fn generate_all(&self, report: &RunReport, output_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let json_path = output_dir.join("results.json");
        self.json.generate(report, &json_path)?;

        let markdown_path = output_dir.join("results.md");
        self.markdown.generate(report, &markdown_path)?;

        let mut written = vec![json_path, markdown_path];

        // Charts need a font backend that may be absent on CI hosts.
        match self.charts.generate_all(report, output_dir) {
            Ok(charts) => written.extend(charts.into_iter().map(|c| output_dir.join(c))),
            Err(e) => tracing::warn!("Skipping charts: {}", e),
        }

        tracing::info!("Reports generated in {}", output_dir.display());
        Ok(written)
    }
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RunSummary;
    use tempfile::TempDir;

    #[test]
    fn test_generate_all_writes_text_reports() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("results");
        let report = RunReport::new("zerg", RunSummary::default(), vec![]);

        let written = ReportGenerator::new().generate_all(&report, &out).unwrap();

        assert!(out.join("results.json").exists());
        assert!(out.join("results.md").exists());
        assert!(written.len() >= 2);
    }
}
