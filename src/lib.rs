//! @ai:module:intent Benchmark execution engine library
//! @ai:module:layer application
//! @ai:module:public_api config, context, error, manifest, metrics, report, resolver, runner, sandbox, toolchain, workspace

pub mod config;
pub mod context;
pub mod error;
pub mod manifest;
pub mod metrics;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod sandbox;
pub mod toolchain;
pub mod workspace;

pub use config::EngineConfig;
pub use context::{ExecutionContext, Redactor, ResolvedValue, SecretString};
pub use manifest::{ManifestLoader, ManifestLoaderTrait, Suite};
pub use metrics::{ResultAggregator, RunReport, TestResult, TestStatus};
pub use report::ReportGenerator;
pub use resolver::{ConfigResolver, EnvSource, ProcessEnv, ResolvedBenchmark};
pub use runner::{BenchmarkRunner, RetryScheduler};
pub use sandbox::{AttemptOutcome, ExecutionSandbox};
pub use toolchain::{ToolchainStatus, ToolchainValidator};
pub use workspace::{Workspace, WorkspaceMaterializer};
