//! @ai:module:intent Chart generation for benchmark runs
//! @ai:module:layer infrastructure
//! @ai:module:public_api ChartGenerator
//! @ai:module:stateless true

use crate::metrics::{RunReport, TestStatus};
use anyhow::{anyhow, Result};
use plotters::prelude::*;
use std::path::Path;

/// @ai:intent Trait for chart generation
pub trait ChartGeneratorTrait: Send + Sync {
    /// @ai:intent Generate all charts from a run; returns file names
    fn generate_all(&self, report: &RunReport, output_dir: &Path) -> Result<Vec<String>>;
}

/// @ai:intent Generates charts from a run
pub struct ChartGenerator;

impl ChartGenerator {
    /// @ai:intent Create a new chart generator
    /// @ai:effects pure
    pub fn new() -> Self {
        Self
    }

    fn status_color(status: TestStatus) -> RGBColor {
        match status {
            TestStatus::Pass => GREEN,
            TestStatus::Fail => RED,
            TestStatus::Timeout => RGBColor(255, 165, 0),
            TestStatus::Error => MAGENTA,
        }
    }

    /// @ai:intent Stacked bar chart of test statuses per domain
    /// @ai:effects fs:write
    fn generate_domain_chart(&self, report: &RunReport, output_path: &Path) -> Result<()> {
        let root = BitMapBackend::new(output_path, (800, 500)).into_drawing_area();
        root.fill(&WHITE)?;

        let domains = &report.summary.domains;
        let max_tests = domains
            .iter()
            .map(|d| d.tests.total())
            .max()
            .unwrap_or(0)
            .max(1);

        let mut chart = ChartBuilder::on(&root)
            .caption("Test Status by Domain", ("sans-serif", 25))
            .margin(20)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(0..domains.len().max(1) as i32, 0u32..max_tests)?;

        chart
            .configure_mesh()
            .y_desc("Tests")
            .x_label_formatter(&|x| {
                domains
                    .get(*x as usize)
                    .map(|d| d.domain.clone())
                    .unwrap_or_default()
            })
            .draw()?;

        for status in TestStatus::all() {
            let color = Self::status_color(status);
            chart
                .draw_series(domains.iter().enumerate().map(|(i, d)| {
                    let below: u32 = TestStatus::all()
                        .iter()
                        .take_while(|s| **s != status)
                        .map(|s| d.tests.get(*s))
                        .sum();
                    Rectangle::new(
                        [(i as i32, below), (i as i32 + 1, below + d.tests.get(status))],
                        color.mix(0.7).filled(),
                    )
                }))?
                .label(status.as_str())
                .legend(move |(x, y)| {
                    Rectangle::new([(x, y - 5), (x + 20, y + 5)], color.mix(0.7).filled())
                });
        }

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .border_style(BLACK)
            .draw()?;

        root.present()?;
        Ok(())
    }
}

impl Default for ChartGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ChartGeneratorTrait for ChartGenerator {
    /// @ai:intent Generate all charts
    /// @ai:effects fs:write
    fn generate_all(&self, report: &RunReport, output_dir: &Path) -> Result<Vec<String>> {
        if report.summary.domains.is_empty() {
            return Err(anyhow!("no domains to chart"));
        }
        std::fs::create_dir_all(output_dir)?;

        let domain_path = output_dir.join("by_domain.png");
        self.generate_domain_chart(report, &domain_path)?;

        Ok(vec!["by_domain.png".to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RunSummary;
    use tempfile::TempDir;

    #[test]
    fn test_status_colors_are_distinct() {
        let colors: Vec<_> = TestStatus::all()
            .iter()
            .map(|s| ChartGenerator::status_color(*s).rgb())
            .collect();
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_empty_report_has_no_chart() {
        let temp = TempDir::new().unwrap();
        let report = RunReport::new("zerg", RunSummary::default(), vec![]);
        assert!(ChartGenerator::new().generate_all(&report, temp.path()).is_err());
        assert!(!temp.path().join("by_domain.png").exists());
    }
}
