//! @ai:module:intent Result types for benchmark runs
//! @ai:module:layer domain
//! @ai:module:public_api TestStatus, TestResult, BenchmarkRun, BenchmarkFailure, FailureStage, BenchmarkResult, StatusCounts, DomainSummary, RunSummary, RunReport
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};
use std::fmt;

/// @ai:intent Terminal status of a test or benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Timeout,
    Error,
}

impl TestStatus {
    /// @ai:intent Convert status to string representation
    /// @ai:effects pure
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pass => "pass",
            TestStatus::Fail => "fail",
            TestStatus::Timeout => "timeout",
            TestStatus::Error => "error",
        }
    }

    pub fn all() -> [TestStatus; 4] {
        [
            TestStatus::Pass,
            TestStatus::Fail,
            TestStatus::Timeout,
            TestStatus::Error,
        ]
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// @ai:intent One result per (benchmark, test) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub domain: String,
    pub benchmark: String,
    pub test_index: usize,
    pub description: String,
    pub status: TestStatus,
    pub message: String,
    pub duration_ms: u64,
    pub attempts: u32,
}

/// @ai:intent Stage at which a benchmark failed before its tests could run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Config,
    Materialization,
    Worker,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Config => "config",
            FailureStage::Materialization => "materialization",
            FailureStage::Worker => "worker",
        }
    }
}

/// @ai:intent Why a benchmark produced no (or incomplete) test results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkFailure {
    pub stage: FailureStage,
    pub message: String,
}

/// @ai:intent Raw output of one benchmark execution, before aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRun {
    pub domain: String,
    pub benchmark: String,
    pub category: String,
    pub failure: Option<BenchmarkFailure>,
    pub warnings: Vec<String>,
    pub tests: Vec<TestResult>,
}

impl BenchmarkRun {
    /// @ai:intent A benchmark that stopped before any test ran
    /// @ai:effects pure
    pub fn failed(
        domain: &str,
        benchmark: &str,
        category: &str,
        stage: FailureStage,
        message: String,
    ) -> Self {
        Self {
            domain: domain.to_string(),
            benchmark: benchmark.to_string(),
            category: category.to_string(),
            failure: Some(BenchmarkFailure { stage, message }),
            warnings: vec![],
            tests: vec![],
        }
    }
}

/// @ai:intent Folded per-benchmark result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub domain: String,
    pub benchmark: String,
    pub category: String,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<BenchmarkFailure>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub tests: Vec<TestResult>,
}

/// @ai:intent Counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pass: u32,
    pub fail: u32,
    pub error: u32,
    pub timeout: u32,
}

impl StatusCounts {
    /// @ai:intent Count one more result with `status`
    /// @ai:effects pure
    pub fn add(&mut self, status: TestStatus) {
        match status {
            TestStatus::Pass => self.pass += 1,
            TestStatus::Fail => self.fail += 1,
            TestStatus::Error => self.error += 1,
            TestStatus::Timeout => self.timeout += 1,
        }
    }

    pub fn merge(&mut self, other: &StatusCounts) {
        self.pass += other.pass;
        self.fail += other.fail;
        self.error += other.error;
        self.timeout += other.timeout;
    }

    pub fn get(&self, status: TestStatus) -> u32 {
        match status {
            TestStatus::Pass => self.pass,
            TestStatus::Fail => self.fail,
            TestStatus::Error => self.error,
            TestStatus::Timeout => self.timeout,
        }
    }

    pub fn total(&self) -> u32 {
        self.pass + self.fail + self.error + self.timeout
    }

    /// @ai:intent Pass percentage, 0 for an empty set
    /// @ai:effects pure
    pub fn pass_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            (self.pass as f64 / self.total() as f64) * 100.0
        }
    }
}

/// @ai:intent Per-domain counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSummary {
    pub domain: String,
    pub benchmarks: StatusCounts,
    pub tests: StatusCounts,
}

/// @ai:intent Suite-wide counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub benchmarks: StatusCounts,
    pub tests: StatusCounts,
    pub domains: Vec<DomainSummary>,
}

impl RunSummary {
    /// @ai:intent Whether every selected benchmark passed
    /// @ai:effects pure
    pub fn all_passed(&self) -> bool {
        self.benchmarks.total() == self.benchmarks.pass
    }
}

/// @ai:intent Complete report of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub suite: String,
    pub summary: RunSummary,
    pub benchmarks: Vec<BenchmarkResult>,
}

impl RunReport {
    /// @ai:intent Stamp aggregated results with the current time
    /// @ai:effects time
    pub fn new(suite: &str, summary: RunSummary, benchmarks: Vec<BenchmarkResult>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            suite: suite.to_string(),
            summary,
            benchmarks,
        }
    }

    /// @ai:intent Benchmarks whose status is not pass
    /// @ai:effects pure
    pub fn failures(&self) -> impl Iterator<Item = &BenchmarkResult> {
        self.benchmarks
            .iter()
            .filter(|b| b.status != TestStatus::Pass)
    }

    /// @ai:intent Whether any benchmark stopped at `stage`
    /// @ai:effects pure
    pub fn has_failure_at(&self, stage: FailureStage) -> bool {
        self.benchmarks
            .iter()
            .filter_map(|b| b.failure.as_ref())
            .any(|f| f.stage == stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TestStatus::Timeout).unwrap(),
            "\"timeout\""
        );
    }

    #[test]
    fn test_counts() {
        let mut counts = StatusCounts::default();
        for status in [TestStatus::Pass, TestStatus::Pass, TestStatus::Fail, TestStatus::Timeout] {
            counts.add(status);
        }
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.get(TestStatus::Pass), 2);
        assert!((counts.pass_rate() - 50.0).abs() < f64::EPSILON);
        assert_eq!(StatusCounts::default().pass_rate(), 0.0);
    }

    #[test]
    fn test_has_failure_at() {
        let broken = BenchmarkResult {
            domain: "net".to_string(),
            benchmark: "jira".to_string(),
            category: "python".to_string(),
            status: TestStatus::Error,
            failure: Some(BenchmarkFailure {
                stage: FailureStage::Materialization,
                message: "missing reference".to_string(),
            }),
            warnings: vec![],
            tests: vec![],
        };
        let report = RunReport::new("zerg", RunSummary::default(), vec![broken]);

        assert!(report.has_failure_at(FailureStage::Materialization));
        assert!(!report.has_failure_at(FailureStage::Config));
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_empty_summary_counts_as_passed() {
        assert!(RunSummary::default().all_passed());
    }
}
