//! @ai:module:intent CLI for the benchmark execution engine
//! @ai:module:layer presentation

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use zerg_bench::{
    config::EngineConfig,
    manifest::{ManifestLoader, ManifestLoaderTrait, Suite},
    metrics::{FailureStage, RunReport},
    report::ReportGenerator,
    resolver::{ConfigResolver, ProcessEnv},
    runner::{select, BenchmarkRunner},
    sandbox::runtime_for,
    toolchain::ToolchainValidator,
};

/// Every selected benchmark passed.
const EXIT_PASS: u8 = 0;
/// A test failed, errored or timed out, or a workspace could not be built.
const EXIT_FAILURES: u8 = 1;
/// Manifests, engine configuration or the selection could not be used.
const EXIT_CONFIG: u8 = 2;
/// The run finished but its reports could not be written.
const EXIT_REPORT: u8 = 3;

#[derive(Parser)]
#[command(name = "zerg-bench")]
#[command(about = "Run benchmark suites against candidate implementations")]
#[command(version)]
struct Cli {
    /// Path to engine configuration (defaults to bench.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the suite manifest (overrides paths.suite_manifest)
    #[arg(short, long, global = true)]
    suite: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run benchmarks
    Run {
        /// Domain to run; every domain when omitted
        #[arg(short, long)]
        domain: Option<String>,

        /// Single benchmark within the domain
        #[arg(short, long, requires = "domain")]
        benchmark: Option<String>,

        /// Number of benchmarks executed concurrently
        #[arg(short, long)]
        parallelism: Option<usize>,

        /// Directory holding candidate implementations
        #[arg(long)]
        candidate: Option<PathBuf>,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Keep workspaces after the run for inspection
        #[arg(long)]
        keep_workspaces: bool,
    },

    /// List domains in the suite
    ListDomains,

    /// List benchmarks of a domain
    ListBenchmarks {
        #[arg(short, long)]
        domain: String,
    },

    /// Load manifests and resolve every benchmark's configuration
    Validate,

    /// Initialize default configuration
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "bench.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("zerg_bench=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            domain,
            benchmark,
            parallelism,
            candidate,
            output,
            keep_workspaces,
        } => {
            run_benchmarks(
                cli.config,
                cli.suite,
                RunArgs {
                    domain,
                    benchmark,
                    parallelism,
                    candidate,
                    output,
                    keep_workspaces,
                },
            )
            .await
        }
        Commands::ListDomains => list_domains(cli.config, cli.suite),
        Commands::ListBenchmarks { domain } => list_benchmarks(cli.config, cli.suite, &domain),
        Commands::Validate => validate(cli.config, cli.suite),
        Commands::Init { output } => init_config(&output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

struct RunArgs {
    domain: Option<String>,
    benchmark: Option<String>,
    parallelism: Option<usize>,
    candidate: Option<PathBuf>,
    output: Option<PathBuf>,
    keep_workspaces: bool,
}

/// @ai:intent Run the selected benchmarks and write reports
/// @ai:effects fs:read, fs:write, io, env:read
async fn run_benchmarks(
    config_path: Option<PathBuf>,
    suite_path: Option<PathBuf>,
    args: RunArgs,
) -> Result<u8> {
    let mut config = load_or_default_config(config_path)?;

    if let Some(parallelism) = args.parallelism {
        config.run.parallelism = parallelism.max(1);
    }
    if let Some(candidate) = args.candidate {
        config.paths.candidate_dir = candidate;
    }
    config.run.keep_workspaces |= args.keep_workspaces;

    let suite = load_suite(&config, suite_path)?;
    let selection = match select(
        &suite,
        args.domain.as_deref(),
        args.benchmark.as_deref(),
        &config.run.filter,
    ) {
        Ok(selection) => selection,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_CONFIG);
        }
    };

    if selection.is_empty() {
        tracing::warn!("No benchmarks match the selection");
        return Ok(EXIT_PASS);
    }

    let toolchain_status = ToolchainValidator::validate(runtime_for(&config.sandbox).as_ref());
    ToolchainValidator::log_warnings(&toolchain_status);

    tracing::info!("Selected {} benchmarks from suite {}", selection.len(), suite.name);

    let resolver = ConfigResolver::new(ProcessEnv, config.sandbox.clone(), config.retry.clone());
    let runner = BenchmarkRunner::from_config(&config, &suite.root);
    let report = runner.run(&suite, &selection, &resolver).await;

    let timestamp = chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let output_dir = args
        .output
        .unwrap_or_else(|| config.paths.results_dir.clone())
        .join(timestamp.to_string());

    let written = match ReportGenerator::new().generate_all(&report, &output_dir) {
        Ok(_) => true,
        Err(e) => {
            tracing::error!("Failed to write reports: {:#}", e);
            false
        }
    };

    print_summary(&report);
    Ok(exit_code(&report, written))
}

/// @ai:intent Map a finished run to the process exit code
/// @ai:effects pure
fn exit_code(report: &RunReport, reports_written: bool) -> u8 {
    if report.has_failure_at(FailureStage::Config) {
        EXIT_CONFIG
    } else if !reports_written {
        EXIT_REPORT
    } else if report.summary.all_passed() {
        EXIT_PASS
    } else {
        EXIT_FAILURES
    }
}

/// @ai:intent Print the run summary to stdout
/// @ai:effects io
fn print_summary(report: &RunReport) {
    let summary = &report.summary;

    println!();
    println!("Benchmark Results: {}", report.suite);
    println!("==================");
    println!();
    println!(
        "{:<20} {:>6} {:>6} {:>8} {:>6} {:>10}",
        "", "Pass", "Fail", "Timeout", "Error", "Pass rate"
    );
    println!("{}", "-".repeat(62));

    for domain in &summary.domains {
        let t = &domain.tests;
        println!(
            "{:<20} {:>6} {:>6} {:>8} {:>6} {:>9.1}%",
            domain.domain,
            t.pass,
            t.fail,
            t.timeout,
            t.error,
            t.pass_rate()
        );
    }

    let t = &summary.tests;
    println!("{}", "-".repeat(62));
    println!(
        "{:<20} {:>6} {:>6} {:>8} {:>6} {:>9.1}%",
        "All tests", t.pass, t.fail, t.timeout, t.error, t.pass_rate()
    );
    println!(
        "{:<20} {:>6} of {}",
        "Benchmarks passed",
        summary.benchmarks.pass,
        summary.benchmarks.total()
    );

    let mut failures = report.failures().peekable();
    if failures.peek().is_some() {
        println!();
        println!("Failures:");
        for bench in failures {
            println!("  {}/{} [{}]", bench.domain, bench.benchmark, bench.status);
            if let Some(failure) = &bench.failure {
                println!("    {}: {}", failure.stage.as_str(), failure.message);
            }
            for test in bench.tests.iter().filter(|t| t.status != zerg_bench::TestStatus::Pass) {
                let first = test.message.lines().next().unwrap_or("");
                println!(
                    "    #{} {} [{}] {}",
                    test.test_index, test.description, test.status, first
                );
            }
        }
    }
    println!();
}

/// @ai:intent List domains with benchmark counts
/// @ai:effects fs:read, io
fn list_domains(config_path: Option<PathBuf>, suite_path: Option<PathBuf>) -> Result<u8> {
    let config = load_or_default_config(config_path)?;
    let suite = load_suite(&config, suite_path)?;

    println!("Domains in {} ({}):", suite.name, suite.domains.len());
    println!();
    println!("{:<24} {:>10}  {}", "Domain", "Benchmarks", "Description");
    println!("{}", "-".repeat(70));

    for domain in &suite.domains {
        println!(
            "{:<24} {:>10}  {}",
            domain.name,
            domain.benchmarks.len(),
            domain.description
        );
    }

    Ok(EXIT_PASS)
}

/// @ai:intent List the benchmarks of one domain
/// @ai:effects fs:read, io
fn list_benchmarks(
    config_path: Option<PathBuf>,
    suite_path: Option<PathBuf>,
    domain_name: &str,
) -> Result<u8> {
    let config = load_or_default_config(config_path)?;
    let suite = load_suite(&config, suite_path)?;

    let Some(domain) = suite.domain(domain_name) else {
        eprintln!("Error: unknown domain '{}'", domain_name);
        return Ok(EXIT_CONFIG);
    };

    println!("Benchmarks in {} ({}):", domain.name, domain.benchmarks.len());
    println!();
    println!("{:<30} {:<12} {:>6}  {}", "Name", "Category", "Tests", "Description");
    println!("{}", "-".repeat(80));

    for benchmark in &domain.benchmarks {
        println!(
            "{:<30} {:<12} {:>6}  {}",
            benchmark.name,
            benchmark.category,
            benchmark.tests.len(),
            benchmark.description
        );
    }

    Ok(EXIT_PASS)
}

/// @ai:intent Load manifests and resolve every benchmark without executing anything
/// @ai:effects fs:read, env:read, io
fn validate(config_path: Option<PathBuf>, suite_path: Option<PathBuf>) -> Result<u8> {
    let config = load_or_default_config(config_path)?;
    let suite = load_suite(&config, suite_path)?;

    let toolchain_status = ToolchainValidator::validate(runtime_for(&config.sandbox).as_ref());
    ToolchainValidator::log_warnings(&toolchain_status);

    let resolver = ConfigResolver::new(ProcessEnv, config.sandbox.clone(), config.retry.clone());
    let mut unresolved = 0;

    println!(
        "Suite {}: {} domains, {} benchmarks",
        suite.name,
        suite.domains.len(),
        suite.benchmark_count()
    );

    for (domain, benchmark, resolved) in resolver.resolve_all(&suite) {
        match resolved {
            Ok(resolved) => println!(
                "  ok    {}/{} ({} tests, {} context entries)",
                domain.name,
                benchmark.name,
                resolved.tests.len(),
                resolved.context.len()
            ),
            Err(e) => {
                unresolved += 1;
                println!("  error {}/{}: {}", domain.name, benchmark.name, e);
            }
        }
    }

    if unresolved > 0 {
        println!("{} benchmarks could not be resolved", unresolved);
        return Ok(EXIT_CONFIG);
    }

    println!("Suite validation passed!");
    Ok(EXIT_PASS)
}

/// @ai:intent Write default engine configuration
/// @ai:effects fs:write
fn init_config(output: &Path) -> Result<u8> {
    let config = EngineConfig::default();
    config.save(output)?;
    println!("Configuration saved to {}", output.display());
    Ok(EXIT_PASS)
}

/// @ai:intent Load the engine configuration, or defaults when no file exists
/// @ai:effects fs:read
fn load_or_default_config(path: Option<PathBuf>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::load(&p)
            .with_context(|| format!("Failed to load configuration {}", p.display())),
        None => {
            let default_path = PathBuf::from("bench.toml");

            if default_path.exists() {
                EngineConfig::load(&default_path).context("Failed to load bench.toml")
            } else {
                Ok(EngineConfig::default())
            }
        }
    }
}

/// @ai:intent Load the suite named on the command line or in the configuration
/// @ai:effects fs:read
fn load_suite(config: &EngineConfig, suite_path: Option<PathBuf>) -> Result<Suite> {
    let path = suite_path.unwrap_or_else(|| config.paths.suite_manifest.clone());
    tracing::info!("Loading suite from {}", path.display());

    let suite = ManifestLoader::new()
        .load_suite(&path)
        .with_context(|| format!("Failed to load suite {}", path.display()))?;

    tracing::info!(
        "Loaded {} domains, {} benchmarks",
        suite.domains.len(),
        suite.benchmark_count()
    );
    Ok(suite)
}
