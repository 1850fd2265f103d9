//! @ai:module:intent Fold test results into benchmark, domain and suite summaries
//! @ai:module:layer application
//! @ai:module:public_api ResultAggregator, ResultAggregatorTrait, Aggregate
//! @ai:module:stateless true

use crate::metrics::types::{
    BenchmarkResult, BenchmarkRun, DomainSummary, RunSummary, StatusCounts, TestStatus,
};
use std::collections::BTreeMap;

/// @ai:intent Folded results: per-benchmark statuses plus counts
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub summary: RunSummary,
    pub benchmarks: Vec<BenchmarkResult>,
}

/// @ai:intent Trait for result aggregation
pub trait ResultAggregatorTrait: Send + Sync {
    /// @ai:intent Aggregate benchmark runs; independent of input order
    fn aggregate(&self, runs: &[BenchmarkRun]) -> Aggregate;
}

/// @ai:intent Pure fold over benchmark runs
pub struct ResultAggregator;

impl ResultAggregator {
    /// @ai:intent Create a new result aggregator
    /// @ai:effects pure
    pub fn new() -> Self {
        Self
    }

    /// @ai:intent Benchmark status: error if stopped early, pass iff every test passed, else most severe
    /// @ai:effects pure
    pub fn benchmark_status(run: &BenchmarkRun) -> TestStatus {
        if run.failure.is_some() {
            return TestStatus::Error;
        }

        run.tests
            .iter()
            .map(|t| t.status)
            .max()
            .unwrap_or(TestStatus::Pass)
    }

    /// @ai:intent Fold one benchmark run
    /// @ai:effects pure
    fn fold_benchmark(run: &BenchmarkRun) -> BenchmarkResult {
        let mut tests = run.tests.clone();
        tests.sort_by_key(|t| t.test_index);

        BenchmarkResult {
            domain: run.domain.clone(),
            benchmark: run.benchmark.clone(),
            category: run.category.clone(),
            status: Self::benchmark_status(run),
            failure: run.failure.clone(),
            warnings: run.warnings.clone(),
            tests,
        }
    }
}

impl Default for ResultAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultAggregatorTrait for ResultAggregator {
    /// @ai:intent Aggregate runs into summaries
    /// @ai:effects pure
    fn aggregate(&self, runs: &[BenchmarkRun]) -> Aggregate {
        let mut benchmarks: Vec<BenchmarkResult> = runs.iter().map(Self::fold_benchmark).collect();
        benchmarks.sort_by(|a, b| {
            a.domain
                .cmp(&b.domain)
                .then_with(|| a.benchmark.cmp(&b.benchmark))
        });

        let mut by_domain: BTreeMap<&str, DomainSummary> = BTreeMap::new();
        let mut summary = RunSummary::default();

        for result in &benchmarks {
            let domain = by_domain
                .entry(result.domain.as_str())
                .or_insert_with(|| DomainSummary {
                    domain: result.domain.clone(),
                    benchmarks: StatusCounts::default(),
                    tests: StatusCounts::default(),
                });

            domain.benchmarks.add(result.status);
            for test in &result.tests {
                domain.tests.add(test.status);
            }
        }

        for domain in by_domain.values() {
            summary.benchmarks.merge(&domain.benchmarks);
            summary.tests.merge(&domain.tests);
        }
        summary.domains = by_domain.into_values().collect();

        Aggregate {
            summary,
            benchmarks,
        }
    }
}
