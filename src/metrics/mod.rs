//! @ai:module:intent Result collection and aggregation
//! @ai:module:layer application
//! @ai:module:public_api TestStatus, TestResult, BenchmarkResult, RunSummary, RunReport, ResultAggregator

pub mod aggregator;
pub mod types;

pub use aggregator::{Aggregate, ResultAggregator, ResultAggregatorTrait};
pub use types::{
    BenchmarkFailure, BenchmarkResult, BenchmarkRun, DomainSummary, FailureStage, RunReport,
    RunSummary, StatusCounts, TestResult, TestStatus,
};
