//! @ai:module:intent Markdown report generation
//! @ai:module:layer infrastructure
//! @ai:module:public_api MarkdownReporter
//! @ai:module:stateless true

use crate::metrics::{RunReport, StatusCounts, TestStatus};
use anyhow::{Context, Result};
use std::fmt::Write as FmtWrite;
use std::path::Path;

/// @ai:intent Trait for Markdown report generation
pub trait MarkdownReporterTrait: Send + Sync {
    /// @ai:intent Generate Markdown report from a run
    fn generate(&self, report: &RunReport, output_path: &Path) -> Result<()>;
}

/// @ai:intent Generates Markdown reports from a run
pub struct MarkdownReporter;

impl MarkdownReporter {
    /// @ai:intent Create a new Markdown reporter
    /// @ai:effects pure
    pub fn new() -> Self {
        Self
    }

    /// @ai:intent Make a message safe for a single table cell
    /// @ai:effects pure
    fn cell(text: &str) -> String {
        let first = text.lines().next().unwrap_or("");
        let mut cell = first.replace('|', "\\|");
        if cell.chars().count() > 80 {
            cell = cell.chars().take(77).collect::<String>() + "...";
        }
        cell
    }

    /// @ai:intent Render one counts row
    /// @ai:effects pure
    fn counts_row(label: &str, counts: &StatusCounts) -> String {
        format!(
            "| {} | {} | {} | {} | {} | {:.1}% |",
            label,
            counts.pass,
            counts.fail,
            counts.timeout,
            counts.error,
            counts.pass_rate()
        )
    }

    /// @ai:intent Generate header and overall summary
    /// @ai:effects pure
    fn generate_summary(report: &RunReport) -> String {
        let mut output = String::new();

        writeln!(output, "# Benchmark Results: {}", report.suite).unwrap();
        writeln!(output).unwrap();
        writeln!(output, "**Date:** {}", report.timestamp).unwrap();
        writeln!(output).unwrap();
        writeln!(output, "## Summary").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "| Scope | Pass | Fail | Timeout | Error | Pass Rate |").unwrap();
        writeln!(output, "|-------|------|------|---------|-------|-----------|").unwrap();
        writeln!(output, "{}", Self::counts_row("Benchmarks", &report.summary.benchmarks)).unwrap();
        writeln!(output, "{}", Self::counts_row("Tests", &report.summary.tests)).unwrap();
        writeln!(output).unwrap();

        output
    }

    /// @ai:intent Generate one table per domain
    /// @ai:effects pure
    fn generate_domain_sections(report: &RunReport) -> String {
        let mut output = String::new();

        for domain in &report.summary.domains {
            writeln!(output, "## Domain: {}", domain.domain).unwrap();
            writeln!(output).unwrap();
            writeln!(
                output,
                "{} of {} benchmarks passed, {} of {} tests passed.",
                domain.benchmarks.pass,
                domain.benchmarks.total(),
                domain.tests.pass,
                domain.tests.total()
            )
            .unwrap();
            writeln!(output).unwrap();
            writeln!(output, "| Benchmark | Category | Status | Tests | Message |").unwrap();
            writeln!(output, "|-----------|----------|--------|-------|---------|").unwrap();

            for bench in report.benchmarks.iter().filter(|b| b.domain == domain.domain) {
                let passed = bench
                    .tests
                    .iter()
                    .filter(|t| t.status == TestStatus::Pass)
                    .count();
                let message = bench
                    .failure
                    .as_ref()
                    .map(|f| format!("{}: {}", f.stage.as_str(), f.message))
                    .or_else(|| {
                        bench
                            .tests
                            .iter()
                            .find(|t| t.status != TestStatus::Pass)
                            .map(|t| t.message.clone())
                    })
                    .unwrap_or_default();

                writeln!(
                    output,
                    "| {} | {} | {} | {}/{} | {} |",
                    bench.benchmark,
                    bench.category,
                    bench.status,
                    passed,
                    bench.tests.len(),
                    Self::cell(&message)
                )
                .unwrap();
            }

            writeln!(output).unwrap();
        }

        output
    }

    /// @ai:intent Full messages for every non-passing benchmark
    /// @ai:effects pure
    fn generate_failures_section(report: &RunReport) -> String {
        let mut output = String::new();
        let mut failures = report.failures().peekable();
        if failures.peek().is_none() {
            return output;
        }

        writeln!(output, "## Failures").unwrap();
        writeln!(output).unwrap();

        for bench in failures {
            writeln!(output, "### {}/{} ({})", bench.domain, bench.benchmark, bench.status).unwrap();
            writeln!(output).unwrap();

            if let Some(failure) = &bench.failure {
                writeln!(output, "Stopped during {}:", failure.stage.as_str()).unwrap();
                writeln!(output).unwrap();
                writeln!(output, "```text\n{}\n```", failure.message).unwrap();
                writeln!(output).unwrap();
            }

            for test in bench.tests.iter().filter(|t| t.status != TestStatus::Pass) {
                writeln!(
                    output,
                    "- test {} `{}`: **{}** after {} attempt(s), {}ms",
                    test.test_index, test.description, test.status, test.attempts, test.duration_ms
                )
                .unwrap();
                writeln!(output).unwrap();
                writeln!(output, "```text\n{}\n```", test.message).unwrap();
                writeln!(output).unwrap();
            }

            for warning in &bench.warnings {
                writeln!(output, "- warning: {}", warning).unwrap();
            }
        }

        output
    }
}

impl Default for MarkdownReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownReporterTrait for MarkdownReporter {
    /// @ai:intent Generate Markdown report to file
    /// @ai:effects fs:write
    fn generate(&self, report: &RunReport, output_path: &Path) -> Result<()> {
        let mut content = String::new();

        content.push_str(&Self::generate_summary(report));
        content.push_str(&Self::generate_domain_sections(report));
        content.push_str(&Self::generate_failures_section(report));

        std::fs::write(output_path, content)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        Ok(())
    }
}
