//! @ai:module:intent Benchmark orchestration and retry control
//! @ai:module:layer application
//! @ai:module:public_api BenchmarkRunner, RetryScheduler, RetryPolicy, BackoffSchedule, TestState, select

pub mod executor;
pub mod retry;

pub use executor::{select, BenchmarkRunner, Selection};
pub use retry::{BackoffSchedule, RetryPolicy, RetryResult, RetryScheduler, TestState};
