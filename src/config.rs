//! @ai:module:intent Engine configuration loaded from bench.toml
//! @ai:module:layer infrastructure
//! @ai:module:public_api EngineConfig, PathConfig, RunConfig, SandboxConfig, RetryConfig, FilterConfig, RuntimeKind
//! @ai:module:stateless true

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// @ai:intent Main configuration for the benchmark engine
/// @ai:effects pure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// @ai:intent Input and output locations
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default = "default_suite_manifest")]
    pub suite_manifest: PathBuf,
    #[serde(default = "default_candidate_dir")]
    pub candidate_dir: PathBuf,
    /// Parent of per-benchmark workspaces; the system temp dir when unset
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

/// @ai:intent Run-wide execution settings
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub keep_workspaces: bool,
    #[serde(default)]
    pub filter: FilterConfig,
}

/// @ai:intent Candidate language runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    Python,
    Shell,
}

impl RuntimeKind {
    /// @ai:intent Convert runtime to string representation
    /// @ai:effects pure
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Python => "python",
            RuntimeKind::Shell => "shell",
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// @ai:intent Sandbox defaults; suite constants may override timeout per benchmark
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_runtime")]
    pub runtime: RuntimeKind,
    /// Overrides the runtime's default program (python3 / sh)
    #[serde(default)]
    pub interpreter: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_candidate_modules")]
    pub candidate_modules: Vec<String>,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

/// @ai:intent Retry defaults for transient errors
/// @ai:effects pure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

/// @ai:intent Filter configuration for selecting benchmarks
/// @ai:effects pure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    pub domains: Option<Vec<String>>,
    pub benchmarks: Option<Vec<String>>,
    pub categories: Option<Vec<String>>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            suite_manifest: default_suite_manifest(),
            candidate_dir: default_candidate_dir(),
            workspace_root: None,
            results_dir: default_results_dir(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            keep_workspaces: false,
            filter: FilterConfig::default(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime(),
            interpreter: None,
            timeout_secs: default_timeout_secs(),
            candidate_modules: default_candidate_modules(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

fn default_suite_manifest() -> PathBuf {
    PathBuf::from("suite.yaml")
}

fn default_candidate_dir() -> PathBuf {
    PathBuf::from("candidate")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_parallelism() -> usize {
    1
}

fn default_runtime() -> RuntimeKind {
    RuntimeKind::Python
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_candidate_modules() -> Vec<String> {
    vec!["main".to_string(), "connector".to_string()]
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_base_ms() -> u64 {
    250
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

impl EngineConfig {
    /// @ai:intent Load configuration from a TOML file
    /// @ai:pre path exists and is readable
    /// @ai:effects fs:read
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// @ai:intent Save configuration to a TOML file
    /// @ai:effects fs:write
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl FilterConfig {
    /// @ai:intent Check if filter matches a benchmark
    /// @ai:effects pure
    pub fn matches(&self, domain: &str, benchmark: &str, category: &str) -> bool {
        let domain_match = self
            .domains
            .as_ref()
            .map(|d| d.iter().any(|name| name == domain))
            .unwrap_or(true);

        let benchmark_match = self
            .benchmarks
            .as_ref()
            .map(|b| b.iter().any(|name| name == benchmark))
            .unwrap_or(true);

        let category_match = self
            .categories
            .as_ref()
            .map(|c| c.iter().any(|cat| cat == category))
            .unwrap_or(true);

        domain_match && benchmark_match && category_match
    }
}
