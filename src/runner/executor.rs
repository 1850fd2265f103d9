//! @ai:module:intent Orchestrate resolution, staging, sandboxed execution and aggregation per benchmark
//! @ai:module:layer application
//! @ai:module:public_api BenchmarkRunner, Selection, select
//! @ai:module:stateless false

use crate::config::{EngineConfig, FilterConfig};
use crate::error::SelectionError;
use crate::manifest::{Benchmark, Domain, Suite};
use crate::metrics::{
    BenchmarkRun, FailureStage, ResultAggregator, ResultAggregatorTrait, RunReport, TestResult,
    TestStatus,
};
use crate::resolver::{ConfigResolver, EnvSource, ResolvedBenchmark, ResolvedTest};
use crate::runner::retry::{RetryPolicy, RetryScheduler};
use crate::sandbox::{AttemptOutcome, ExecutionSandbox};
use crate::workspace::{Workspace, WorkspaceMaterializer};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// @ai:intent Benchmarks chosen for a run, in catalog order
pub type Selection<'a> = Vec<(&'a Domain, &'a Benchmark)>;

/// @ai:intent Choose benchmarks by optional domain/benchmark name and the configured filter
/// @ai:effects pure
pub fn select<'a>(
    suite: &'a Suite,
    domain: Option<&str>,
    benchmark: Option<&str>,
    filter: &FilterConfig,
) -> Result<Selection<'a>, SelectionError> {
    let domains: Vec<&Domain> = match domain {
        Some(name) => vec![suite
            .domain(name)
            .ok_or_else(|| SelectionError::UnknownDomain(name.to_string()))?],
        None => suite.domains.iter().collect(),
    };

    if let (Some(domain), Some(name)) = (domain, benchmark) {
        if domains.iter().all(|d| d.benchmark(name).is_none()) {
            return Err(SelectionError::UnknownBenchmark {
                domain: domain.to_string(),
                benchmark: name.to_string(),
            });
        }
    }

    Ok(domains
        .into_iter()
        .flat_map(|d| d.benchmarks.iter().map(move |b| (d, b)))
        .filter(|(_, b)| benchmark.map(|name| b.name == name).unwrap_or(true))
        .filter(|(d, b)| filter.matches(&d.name, &b.name, &b.category))
        .collect())
}

/// @ai:intent Runs selected benchmarks in bounded parallel workers
pub struct BenchmarkRunner {
    sandbox: Arc<ExecutionSandbox>,
    materializer: Arc<WorkspaceMaterializer>,
    parallelism: usize,
    keep_workspaces: bool,
}

impl BenchmarkRunner {
    /// @ai:intent Create a runner from explicit collaborators
    /// @ai:effects pure
    pub fn new(
        sandbox: ExecutionSandbox,
        materializer: WorkspaceMaterializer,
        parallelism: usize,
        keep_workspaces: bool,
    ) -> Self {
        Self {
            sandbox: Arc::new(sandbox),
            materializer: Arc::new(materializer),
            parallelism: parallelism.max(1),
            keep_workspaces,
        }
    }

    /// @ai:intent Create a runner for a suite rooted at `suite_root`
    /// @ai:effects pure
    pub fn from_config(config: &EngineConfig, suite_root: &Path) -> Self {
        let materializer = WorkspaceMaterializer::new(
            suite_root.to_path_buf(),
            config.paths.workspace_root.clone(),
            config.paths.candidate_dir.clone(),
        );

        Self::new(
            ExecutionSandbox::from_config(&config.sandbox),
            materializer,
            config.run.parallelism,
            config.run.keep_workspaces,
        )
    }

    /// @ai:intent Resolve, execute and aggregate the selection; failures stay scoped to their benchmark
    /// @ai:effects fs:write, io, env:read
    pub async fn run<E: EnvSource>(
        &self,
        suite: &Suite,
        selection: &Selection<'_>,
        resolver: &ConfigResolver<E>,
    ) -> RunReport {
        let mut runs: Vec<BenchmarkRun> = Vec::with_capacity(selection.len());
        let mut ready: Vec<Arc<ResolvedBenchmark>> = Vec::new();

        for (domain, benchmark) in selection {
            match resolver.resolve(suite, domain, benchmark) {
                Ok(resolved) => ready.push(Arc::new(resolved)),
                Err(e) => {
                    tracing::error!("{}/{}: {}", domain.name, benchmark.name, e);
                    runs.push(BenchmarkRun::failed(
                        &domain.name,
                        &benchmark.name,
                        &benchmark.category,
                        FailureStage::Config,
                        e.to_string(),
                    ));
                }
            }
        }

        tracing::info!(
            "Running {} benchmarks with parallelism {}",
            ready.len(),
            self.parallelism
        );

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut handles = Vec::with_capacity(ready.len());

        for benchmark in ready {
            let semaphore = semaphore.clone();
            let sandbox = self.sandbox.clone();
            let materializer = self.materializer.clone();
            let keep = self.keep_workspaces;
            let worker_benchmark = benchmark.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return BenchmarkRun::failed(
                            &worker_benchmark.domain,
                            &worker_benchmark.name,
                            &worker_benchmark.category,
                            FailureStage::Worker,
                            e.to_string(),
                        )
                    }
                };
                run_benchmark(&sandbox, &materializer, &worker_benchmark, keep).await
            });

            handles.push((benchmark, handle));
        }

        for (benchmark, handle) in handles {
            match handle.await {
                Ok(run) => runs.push(run),
                Err(e) => {
                    // A panicking or cancelled worker only affects its own benchmark.
                    tracing::error!("Worker for {} failed: {}", benchmark.id(), e);
                    runs.push(BenchmarkRun::failed(
                        &benchmark.domain,
                        &benchmark.name,
                        &benchmark.category,
                        FailureStage::Worker,
                        benchmark.redactor.redact(&e.to_string()),
                    ));
                }
            }
        }

        let aggregate = ResultAggregator::new().aggregate(&runs);
        RunReport::new(&suite.name, aggregate.summary, aggregate.benchmarks)
    }
}

/// @ai:intent Stage one benchmark and run its tests sequentially in the same workspace
/// @ai:effects fs:write, io
async fn run_benchmark(
    sandbox: &ExecutionSandbox,
    materializer: &WorkspaceMaterializer,
    benchmark: &ResolvedBenchmark,
    keep_workspace: bool,
) -> BenchmarkRun {
    let workspace = match materializer.materialize(benchmark) {
        Ok(ws) => ws,
        Err(e) => {
            let message = benchmark.redactor.redact(&e.to_string());
            tracing::error!("{}: {}", benchmark.id(), message);
            return BenchmarkRun::failed(
                &benchmark.domain,
                &benchmark.name,
                &benchmark.category,
                FailureStage::Materialization,
                message,
            );
        }
    };

    let scheduler = RetryScheduler::new(RetryPolicy::from(&benchmark.policy));
    let mut tests = Vec::with_capacity(benchmark.tests.len());

    for test in &benchmark.tests {
        let result = run_test(sandbox, &scheduler, benchmark, test, &workspace).await;

        tracing::info!(
            "{} test #{} {} ({} ms, {} attempt(s))",
            benchmark.id(),
            test.index,
            result.status,
            result.duration_ms,
            result.attempts
        );
        tests.push(result);
    }

    let warnings = workspace.warnings.clone();
    if keep_workspace {
        let path = workspace.keep();
        tracing::info!("Kept workspace for {} at {}", benchmark.id(), path.display());
    }

    BenchmarkRun {
        domain: benchmark.domain.clone(),
        benchmark: benchmark.name.clone(),
        category: benchmark.category.clone(),
        failure: None,
        warnings,
        tests,
    }
}

/// @ai:intent Run one test through the retry scheduler and record a redacted result
/// @ai:effects io
async fn run_test(
    sandbox: &ExecutionSandbox,
    scheduler: &RetryScheduler,
    benchmark: &ResolvedBenchmark,
    test: &ResolvedTest,
    workspace: &Workspace,
) -> TestResult {
    let retried = scheduler
        .run(move |attempt| async move {
            tracing::debug!("{} test #{} attempt {}", benchmark.id(), test.index, attempt);
            let outcome = sandbox
                .execute(
                    test,
                    &benchmark.context,
                    workspace.path(),
                    benchmark.policy.timeout,
                )
                .await;
            // Redact before the scheduler logs a retry message
            AttemptOutcome {
                message: benchmark.redactor.redact(&outcome.message),
                ..outcome
            }
        })
        .await;

    let (status, message, duration_ms, attempts) = match retried {
        Ok(r) => (
            r.outcome.status(),
            r.outcome.message,
            r.outcome.duration.as_millis() as u64,
            r.attempts,
        ),
        Err(e) => (TestStatus::Error, e.to_string(), 0, 0),
    };

    TestResult {
        domain: benchmark.domain.clone(),
        benchmark: benchmark.name.clone(),
        test_index: test.index,
        description: test.description.clone(),
        status,
        message: benchmark.redactor.redact(&message),
        duration_ms,
        attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, RuntimeKind, SandboxConfig};
    use crate::manifest::{ManifestLoader, ManifestLoaderTrait};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const SUITE: &str = r#"
name: zerg
constants:
  timeout_seconds: 5
  max_retries: 2
  retry_backoff_ms: 1
"#;

    const CORE: &str = r#"
name: core
benchmarks:
  - name: hello
    category: shell
    tests:
      - description: exact greeting
        function_to_run: |
          zerg_import main
          zerg_assert_eq "$(hello_world)" "Hello World"
  - name: secret
    category: shell
    configs:
      - name: token
        value: !env ZERG_RUNNER_TOKEN
        required: true
    tests:
      - description: leaks the token in its failure message
        function_to_run: |
          zerg_require token
          zerg_fail "bad token $(zerg_get token)"
  - name: needs_env
    category: shell
    configs:
      - name: missing
        env: ZERG_RUNNER_UNSET
        required: true
    tests:
      - description: never runs
        function_to_run: "true"
  - name: needs_reference
    category: shell
    references:
      - file_path: domains/absent.txt
        workspace_path: absent.txt
    tests:
      - description: never runs
        function_to_run: "true"
  - name: hangs
    category: shell
    constants:
      timeout_seconds: 1
    tests:
      - description: infinite loop
        function_to_run: "while :; do :; done"
      - description: still runs after the timeout
        function_to_run: "true"
"#;

    const FLAKY: &str = r#"
name: flaky
benchmarks:
  - name: flaky_secret
    category: shell
    configs:
      - name: token
        value: !env ZERG_RUNNER_TOKEN
        required: true
    tests:
      - description: keeps reporting a transient error with the token in it
        function_to_run: |
          zerg_require token
          zerg_transient "upstream rejected $(zerg_get token)"
"#;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        temp: TempDir,
        suite: Suite,
    }

    fn fixture(hello: &str) -> Fixture {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("domains")).unwrap();
        std::fs::write(temp.path().join("suite.yaml"), SUITE).unwrap();
        std::fs::write(temp.path().join("domains/core.yaml"), CORE).unwrap();
        std::fs::write(temp.path().join("domains/flaky.yaml"), FLAKY).unwrap();

        let candidate = temp.path().join("candidate/core/hello");
        std::fs::create_dir_all(&candidate).unwrap();
        std::fs::write(
            candidate.join("main.sh"),
            format!("hello_world() {{ printf '{hello}'; }}\n"),
        )
        .unwrap();

        let suite = ManifestLoader::new()
            .load_suite(&temp.path().join("suite.yaml"))
            .unwrap();
        Fixture { temp, suite }
    }

    fn runner(fx: &Fixture, parallelism: usize) -> BenchmarkRunner {
        let config = EngineConfig {
            sandbox: SandboxConfig {
                runtime: RuntimeKind::Shell,
                ..Default::default()
            },
            ..Default::default()
        };
        let materializer = WorkspaceMaterializer::new(
            fx.temp.path().to_path_buf(),
            Some(fx.temp.path().join("workspaces")),
            fx.temp.path().join("candidate"),
        );
        BenchmarkRunner::new(
            ExecutionSandbox::from_config(&config.sandbox),
            materializer,
            parallelism,
            false,
        )
    }

    fn resolver() -> ConfigResolver<HashMap<String, String>> {
        let env = HashMap::from([("ZERG_RUNNER_TOKEN".to_string(), "tok-98765".to_string())]);
        ConfigResolver::new(env, SandboxConfig::default(), RetryConfig::default())
    }

    #[test]
    fn test_select_unknown_names() {
        let fx = fixture("Hello World");
        let filter = FilterConfig::default();

        assert_eq!(
            select(&fx.suite, Some("nope"), None, &filter).unwrap_err(),
            SelectionError::UnknownDomain("nope".to_string())
        );
        assert!(matches!(
            select(&fx.suite, Some("core"), Some("nope"), &filter),
            Err(SelectionError::UnknownBenchmark { .. })
        ));
        assert_eq!(select(&fx.suite, Some("core"), None, &filter).unwrap().len(), 5);
        assert_eq!(
            select(&fx.suite, None, Some("hello"), &filter).unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_run_scopes_failures_per_benchmark() {
        let fx = fixture("Hello World");
        let selection = select(&fx.suite, Some("core"), None, &FilterConfig::default()).unwrap();

        let report = runner(&fx, 3).run(&fx.suite, &selection, &resolver()).await;
        let find = |name: &str| {
            report
                .benchmarks
                .iter()
                .find(|b| b.benchmark == name)
                .unwrap()
        };

        assert_eq!(report.benchmarks.len(), 5);
        assert_eq!(find("hello").status, TestStatus::Pass);

        let needs_env = find("needs_env");
        assert_eq!(needs_env.status, TestStatus::Error);
        assert_eq!(needs_env.failure.as_ref().unwrap().stage, FailureStage::Config);
        assert!(needs_env.tests.is_empty());

        let needs_reference = find("needs_reference");
        assert_eq!(needs_reference.status, TestStatus::Error);
        assert_eq!(
            needs_reference.failure.as_ref().unwrap().stage,
            FailureStage::Materialization
        );
        assert!(needs_reference.tests.is_empty());

        let hangs = find("hangs");
        assert_eq!(hangs.status, TestStatus::Timeout);
        assert_eq!(hangs.tests[0].status, TestStatus::Timeout);
        assert_eq!(hangs.tests[0].attempts, 1);
        assert_eq!(hangs.tests[1].status, TestStatus::Pass);

        let summary = &report.summary;
        assert_eq!(summary.tests.total(), 4);
        assert_eq!(summary.benchmarks.total(), 5);
        assert!(!summary.all_passed());
    }

    #[tokio::test]
    async fn test_secrets_are_redacted_from_messages() {
        let fx = fixture("Hello World");
        let selection =
            select(&fx.suite, Some("core"), Some("secret"), &FilterConfig::default()).unwrap();

        let report = runner(&fx, 1).run(&fx.suite, &selection, &resolver()).await;
        let secret = &report.benchmarks[0];

        assert_eq!(secret.status, TestStatus::Fail);
        assert!(secret.tests[0].message.contains("[REDACTED]"));
        assert!(!serde_json::to_string(&report).unwrap().contains("tok-98765"));
    }

    #[tokio::test]
    async fn test_retry_logs_are_redacted() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let fx = fixture("Hello World");
        let selection = select(
            &fx.suite,
            Some("flaky"),
            Some("flaky_secret"),
            &FilterConfig::default(),
        )
        .unwrap();
        let report = runner(&fx, 1).run(&fx.suite, &selection, &resolver()).await;

        let flaky = &report.benchmarks[0];
        assert_eq!(flaky.status, TestStatus::Error);
        assert_eq!(flaky.tests[0].attempts, 3);
        assert!(flaky.tests[0].message.contains("[REDACTED]"));

        let logs = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("retrying"));
        assert!(logs.contains("upstream rejected [REDACTED]"));
        assert!(!logs.contains("tok-98765"));
    }

    #[tokio::test]
    async fn test_case_mismatch_fails_hello() {
        let fx = fixture("Hello world");
        let selection =
            select(&fx.suite, Some("core"), Some("hello"), &FilterConfig::default()).unwrap();

        let report = runner(&fx, 1).run(&fx.suite, &selection, &resolver()).await;
        assert_eq!(report.benchmarks[0].status, TestStatus::Fail);
        assert!(report.benchmarks[0].tests[0].message.contains("AssertionError"));
    }
}
