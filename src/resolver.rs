//! @ai:module:intent Layered config resolution: suite -> domain -> benchmark, override by name
//! @ai:module:layer application
//! @ai:module:public_api ConfigResolver, EnvSource, ProcessEnv, ResolvedBenchmark, ResolvedTest, ExecutionPolicy, Layer
//! @ai:module:stateless true

use crate::config::{RetryConfig, SandboxConfig};
use crate::context::{DeferredFunction, ExecutionContext, Redactor, ResolvedValue, SecretString};
use crate::error::ConfigResolutionError;
use crate::manifest::{Benchmark, ConfigEntry, ConfigValue, Constants, Domain, Reference, Suite};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

/// Constant names that drive the execution policy
pub const TIMEOUT_CONSTANT: &str = "timeout_seconds";
pub const MAX_RETRIES_CONSTANT: &str = "max_retries";
pub const BACKOFF_CONSTANT: &str = "retry_backoff_ms";

/// @ai:intent Read-only view of environment variables
pub trait EnvSource: Send + Sync {
    /// @ai:intent Current value of a variable, None when unset
    fn var(&self, name: &str) -> Option<String>;
}

/// @ai:intent The process environment; never mutated by the engine
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl EnvSource for BTreeMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// @ai:intent Scope an effective entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    Suite,
    Domain,
    Benchmark,
}

/// @ai:intent Time and retry limits for one benchmark
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

/// @ai:intent A test with its bound validation function
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTest {
    pub index: usize,
    pub description: String,
    pub function: DeferredFunction,
}

/// @ai:intent A benchmark ready for materialization and execution
#[derive(Debug, Clone)]
pub struct ResolvedBenchmark {
    pub domain: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub tests: Vec<ResolvedTest>,
    pub references: Vec<Reference>,
    pub context: ExecutionContext,
    pub origins: BTreeMap<String, Layer>,
    pub policy: ExecutionPolicy,
    pub redactor: Redactor,
}

impl ResolvedBenchmark {
    /// @ai:intent Stable identifier used in logs and workspace names
    /// @ai:effects pure
    pub fn id(&self) -> String {
        format!("{}/{}", self.domain, self.name)
    }
}

/// @ai:intent Produces one effective configuration per benchmark
pub struct ConfigResolver<E: EnvSource> {
    env: E,
    sandbox: SandboxConfig,
    retry: RetryConfig,
    reference_regexes: Vec<Regex>,
}

impl<E: EnvSource> ConfigResolver<E> {
    /// @ai:intent Create a resolver reading directives from `env`
    /// @ai:effects pure
    pub fn new(env: E, sandbox: SandboxConfig, retry: RetryConfig) -> Self {
        Self {
            env,
            sandbox,
            retry,
            reference_regexes: vec![
                Regex::new(r#"zerg_state\s*\.\s*(?:get|require)\s*\(\s*["']([^"']+)["']"#).unwrap(),
                Regex::new(r#"zerg_state\s*\[\s*["']([^"']+)["']\s*\]"#).unwrap(),
                Regex::new(r#"\bzerg_(?:get|require)\s+["']?([A-Za-z0-9_.\-]+)"#).unwrap(),
            ],
        }
    }

    /// @ai:intent Config names a validation function reads from `zerg_state`
    /// @ai:effects pure
    pub fn config_references(&self, source: &str) -> BTreeSet<String> {
        self.reference_regexes
            .iter()
            .flat_map(|re| re.captures_iter(source))
            .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// @ai:intent Resolve one benchmark against its domain and suite
    /// @ai:pre benchmark belongs to domain, domain belongs to suite
    /// @ai:effects env:read
    pub fn resolve(
        &self,
        suite: &Suite,
        domain: &Domain,
        benchmark: &Benchmark,
    ) -> Result<ResolvedBenchmark, ConfigResolutionError> {
        let constants = layer_constants(&[
            &suite.constants,
            &domain.constants,
            &benchmark.constants,
        ]);
        let configs = layer_configs(&[
            (Layer::Suite, suite.configs.as_slice()),
            (Layer::Domain, domain.configs.as_slice()),
            (Layer::Benchmark, benchmark.configs.as_slice()),
        ]);

        let policy = self.policy(&constants)?;

        let mut entries: BTreeMap<String, ResolvedValue> = BTreeMap::new();
        let mut origins: BTreeMap<String, Layer> = BTreeMap::new();

        for (name, (value, layer)) in constants {
            entries.insert(name.clone(), ResolvedValue::Literal(value));
            origins.insert(name, layer);
        }

        for (name, (entry, layer)) in configs {
            // Within one layer a directive wins over a constant; across layers the more specific one wins
            if origins.get(&name).is_some_and(|shadowing| *shadowing > layer) {
                continue;
            }
            let value = self.resolve_entry(entry)?;
            entries.insert(name.clone(), value);
            origins.insert(name, layer);
        }

        let context = ExecutionContext::new(entries);

        let tests = benchmark
            .tests
            .iter()
            .enumerate()
            .map(|(index, test)| {
                for name in self.config_references(&test.function) {
                    if !context.is_defined(&name) {
                        return Err(ConfigResolutionError::UndefinedReference {
                            benchmark: benchmark.name.clone(),
                            test: index,
                            name,
                        });
                    }
                }

                Ok(ResolvedTest {
                    index,
                    description: test.description.clone(),
                    function: DeferredFunction {
                        source: test.function.clone(),
                    },
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let redactor = context.redactor();

        Ok(ResolvedBenchmark {
            domain: domain.name.clone(),
            name: benchmark.name.clone(),
            category: benchmark.category.clone(),
            description: benchmark.description.clone(),
            tests,
            references: benchmark.references.clone(),
            context,
            origins,
            policy,
            redactor,
        })
    }

    /// @ai:intent Resolve every benchmark of the suite, keeping failures per benchmark
    /// @ai:effects env:read
    pub fn resolve_all<'a>(
        &self,
        suite: &'a Suite,
    ) -> Vec<(&'a Domain, &'a Benchmark, Result<ResolvedBenchmark, ConfigResolutionError>)> {
        suite
            .domains
            .iter()
            .flat_map(|domain| {
                domain
                    .benchmarks
                    .iter()
                    .map(move |benchmark| (domain, benchmark))
            })
            .map(|(domain, benchmark)| (domain, benchmark, self.resolve(suite, domain, benchmark)))
            .collect()
    }

    /// @ai:intent Resolve a single directive
    /// @ai:effects env:read
    fn resolve_entry(&self, entry: &ConfigEntry) -> Result<ResolvedValue, ConfigResolutionError> {
        match &entry.value {
            ConfigValue::Literal(v) => Ok(ResolvedValue::Literal(v.clone())),
            ConfigValue::FunctionBody(source) => Ok(ResolvedValue::Function(DeferredFunction {
                source: source.clone(),
            })),
            ConfigValue::EnvRef(variable) => match self.env.var(variable) {
                Some(value) => Ok(ResolvedValue::Secret(SecretString::new(value))),
                None if entry.required => Err(ConfigResolutionError::MissingEnvironment {
                    config: entry.name.clone(),
                    variable: variable.clone(),
                }),
                None => {
                    tracing::debug!(
                        "Optional config {} left absent ({} unset)",
                        entry.name,
                        variable
                    );
                    Ok(ResolvedValue::Absent)
                }
            },
        }
    }

    /// @ai:intent Derive timeout and retry limits from constants and engine defaults
    /// @ai:effects pure
    fn policy(
        &self,
        constants: &BTreeMap<String, (serde_json::Value, Layer)>,
    ) -> Result<ExecutionPolicy, ConfigResolutionError> {
        let numeric = |name: &'static str| -> Result<Option<u64>, ConfigResolutionError> {
            match constants.get(name) {
                None => Ok(None),
                Some((value, _)) => value.as_u64().map(Some).ok_or(
                    ConfigResolutionError::InvalidConstant {
                        name: name.to_string(),
                        expected: "a non-negative integer",
                    },
                ),
            }
        };

        let timeout_secs = numeric(TIMEOUT_CONSTANT)?.unwrap_or(self.sandbox.timeout_secs);
        let max_retries = match numeric(MAX_RETRIES_CONSTANT)? {
            Some(n) => u32::try_from(n).map_err(|_| ConfigResolutionError::InvalidConstant {
                name: MAX_RETRIES_CONSTANT.to_string(),
                expected: "a 32-bit integer",
            })?,
            None => self.retry.max_retries,
        };
        let backoff_base_ms = numeric(BACKOFF_CONSTANT)?.unwrap_or(self.retry.backoff_base_ms);

        Ok(ExecutionPolicy {
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            backoff_base: Duration::from_millis(backoff_base_ms),
            backoff_max: Duration::from_millis(self.retry.backoff_max_ms.max(backoff_base_ms)),
        })
    }
}

/// @ai:intent Override-by-name merge of constants; later layers replace earlier ones
/// @ai:effects pure
fn layer_constants(layers: &[&Constants; 3]) -> BTreeMap<String, (serde_json::Value, Layer)> {
    let mut merged = BTreeMap::new();

    for (constants, layer) in layers
        .iter()
        .zip([Layer::Suite, Layer::Domain, Layer::Benchmark])
    {
        for (name, value) in constants.iter() {
            merged.insert(name.clone(), (value.clone(), layer));
        }
    }

    merged
}

/// @ai:intent Override-by-name merge of config entries, before any directive is resolved
/// @ai:effects pure
fn layer_configs<'a>(
    layers: &[(Layer, &'a [ConfigEntry]); 3],
) -> BTreeMap<String, (&'a ConfigEntry, Layer)> {
    let mut merged = BTreeMap::new();

    for (layer, entries) in layers.iter() {
        for entry in entries.iter() {
            merged.insert(entry.name.clone(), (entry, *layer));
        }
    }

    merged
}
