//! @ai:module:intent Benchmark catalog definitions and their raw manifest documents
//! @ai:module:layer domain
//! @ai:module:public_api Suite, Domain, Benchmark, Spec, TestCase, Reference, ReferenceSource, ConfigEntry, ConfigValue, Constants
//! @ai:module:stateless true

use crate::error::ManifestError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Named suite constants (timeouts, retry limits, pagination limits, ...)
pub type Constants = BTreeMap<String, serde_json::Value>;

/// @ai:intent Configuration value, possibly a deferred directive
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Literal(serde_json::Value),
    /// Name of the environment variable to read at resolution time
    EnvRef(String),
    /// Candidate-language function source, bound but never invoked by the resolver
    FunctionBody(String),
}

impl ConfigValue {
    /// @ai:intent Short label of the variant for listings
    /// @ai:effects pure
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigValue::Literal(_) => "literal",
            ConfigValue::EnvRef(_) => "env",
            ConfigValue::FunctionBody(_) => "function",
        }
    }
}

/// @ai:intent A named parameter at suite, domain or benchmark scope
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigEntry {
    pub name: String,
    pub description: String,
    pub value: ConfigValue,
    pub required: bool,
}

/// @ai:intent Informational (description, precondition, postcondition) triple
#[derive(Debug, Clone, PartialEq)]
pub struct Spec {
    pub description: String,
    pub precondition: Option<String>,
    pub postcondition: Option<String>,
}

/// @ai:intent A validation function and its description
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub description: String,
    pub function: String,
}

/// @ai:intent Where the bytes of a reference come from
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceSource {
    /// Path relative to the suite root
    File(PathBuf),
    Inline(String),
}

/// @ai:intent Declared input file mapped into the benchmark workspace
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub source: ReferenceSource,
    pub workspace_path: String,
    pub required: bool,
    pub read_only: bool,
}

/// @ai:intent One complete challenge, unresolved (directives intact)
#[derive(Debug, Clone, PartialEq)]
pub struct Benchmark {
    pub name: String,
    pub category: String,
    pub description: String,
    pub specs: Vec<Spec>,
    pub tests: Vec<TestCase>,
    pub references: Vec<Reference>,
    pub configs: Vec<ConfigEntry>,
    pub constants: Constants,
}

/// @ai:intent Named grouping of benchmarks inheriting suite defaults
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub name: String,
    pub description: String,
    pub constants: Constants,
    pub configs: Vec<ConfigEntry>,
    pub benchmarks: Vec<Benchmark>,
    pub source: PathBuf,
}

impl Domain {
    /// @ai:intent Find a benchmark by name
    /// @ai:effects pure
    pub fn benchmark(&self, name: &str) -> Option<&Benchmark> {
        self.benchmarks.iter().find(|b| b.name == name)
    }
}

/// @ai:intent Root scope of a run; immutable after load
#[derive(Debug, Clone, PartialEq)]
pub struct Suite {
    pub name: String,
    pub description: String,
    pub constants: Constants,
    pub configs: Vec<ConfigEntry>,
    pub domains: Vec<Domain>,
    /// Directory reference paths are resolved against
    pub root: PathBuf,
}

impl Suite {
    /// @ai:intent Find a domain by name
    /// @ai:effects pure
    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// @ai:intent Total number of benchmarks across all domains
    /// @ai:effects pure
    pub fn benchmark_count(&self) -> usize {
        self.domains.iter().map(|d| d.benchmarks.len()).sum()
    }
}

/// @ai:intent Raw suite root document
#[derive(Debug, Deserialize)]
pub struct SuiteDocument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub constants: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub configs: Vec<ConfigDocument>,
    #[serde(default)]
    pub domains: Vec<PathBuf>,
    #[serde(default)]
    pub domains_dir: Option<PathBuf>,
}

/// @ai:intent Raw domain document
#[derive(Debug, Deserialize)]
pub struct DomainDocument {
    #[serde(alias = "domain")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub constants: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub configs: Vec<ConfigDocument>,
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkDocument>,
}

/// @ai:intent Raw benchmark entry of a domain document
#[derive(Debug, Deserialize)]
pub struct BenchmarkDocument {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub constants: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    pub specs: Vec<SpecDocument>,
    #[serde(default)]
    pub tests: Vec<TestDocument>,
    #[serde(default)]
    pub references: Vec<ReferenceDocument>,
    #[serde(default)]
    pub configs: Vec<ConfigDocument>,
}

#[derive(Debug, Deserialize)]
pub struct SpecDocument {
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "pre")]
    pub precondition: Option<String>,
    #[serde(default, alias = "post")]
    pub postcondition: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestDocument {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub function_to_run: Option<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ReferenceDocument {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "environment_path")]
    pub workspace_path: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConfigDocument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub value: Option<serde_yaml::Value>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// @ai:intent Interpret a YAML value, turning `!env` / `!function` tags into directives
/// @ai:effects pure
pub fn parse_value(value: serde_yaml::Value) -> Result<ConfigValue, String> {
    match value {
        serde_yaml::Value::Tagged(tagged) => {
            let tagged = *tagged;
            let body = tagged
                .value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("directive {} expects a string", tagged.tag))?;

            if tagged.tag == "env" {
                if body.trim().is_empty() {
                    return Err("!env directive names no variable".to_string());
                }
                Ok(ConfigValue::EnvRef(body.trim().to_string()))
            } else if tagged.tag == "function" {
                Ok(ConfigValue::FunctionBody(body))
            } else {
                Err(format!("unknown directive {}", tagged.tag))
            }
        }
        other => serde_json::to_value(other)
            .map(ConfigValue::Literal)
            .map_err(|e| format!("unsupported literal: {e}")),
    }
}

/// @ai:intent Convert raw constants, rejecting directives
/// @ai:effects pure
pub fn convert_constants(
    raw: BTreeMap<String, serde_yaml::Value>,
    scope: &str,
) -> Result<Constants, ManifestError> {
    raw.into_iter()
        .map(|(name, value)| match parse_value(value) {
            Ok(ConfigValue::Literal(v)) => Ok((name, v)),
            Ok(_) => Err(ManifestError::InvalidDirective {
                scope: scope.to_string(),
                message: format!("constant '{name}' cannot be a directive"),
            }),
            Err(message) => Err(ManifestError::InvalidDirective {
                scope: scope.to_string(),
                message,
            }),
        })
        .collect()
}

/// @ai:intent Convert raw config entries of one layer, rejecting duplicate names
/// @ai:effects pure
pub fn convert_configs(
    raw: Vec<ConfigDocument>,
    scope: &str,
    path: &Path,
) -> Result<Vec<ConfigEntry>, ManifestError> {
    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(raw.len());

    for doc in raw {
        if doc.name.trim().is_empty() {
            return Err(ManifestError::Malformed {
                path: path.to_path_buf(),
                message: format!("config without a name in {scope}"),
            });
        }

        if !seen.insert(doc.name.clone()) {
            return Err(ManifestError::DuplicateConfig {
                scope: scope.to_string(),
                name: doc.name,
            });
        }

        let value = match (doc.env, doc.value) {
            (Some(_), Some(_)) => {
                return Err(ManifestError::InvalidDirective {
                    scope: scope.to_string(),
                    message: format!("config '{}' declares both env and value", doc.name),
                })
            }
            (Some(variable), None) => ConfigValue::EnvRef(variable),
            (None, Some(value)) => {
                parse_value(value).map_err(|message| ManifestError::InvalidDirective {
                    scope: scope.to_string(),
                    message: format!("config '{}': {message}", doc.name),
                })?
            }
            (None, None) => ConfigValue::Literal(serde_json::Value::Null),
        };

        entries.push(ConfigEntry {
            name: doc.name,
            description: doc.description,
            value,
            required: doc.required,
        });
    }

    Ok(entries)
}

impl BenchmarkDocument {
    /// @ai:intent Validate and convert a raw benchmark entry
    /// @ai:effects pure
    pub fn into_benchmark(self, domain: &str, path: &Path) -> Result<Benchmark, ManifestError> {
        let scope = format!("benchmark '{}/{}'", domain, self.name);

        if self.name.trim().is_empty() {
            return Err(ManifestError::Malformed {
                path: path.to_path_buf(),
                message: format!("benchmark without a name in domain '{domain}'"),
            });
        }

        let tests = self
            .tests
            .into_iter()
            .enumerate()
            .map(|(index, test)| {
                let missing = || ManifestError::MissingValidationFunction {
                    benchmark: self.name.clone(),
                    index,
                };

                let function = match test.function_to_run.map(parse_value) {
                    Some(Ok(ConfigValue::FunctionBody(body))) => body,
                    Some(Ok(ConfigValue::Literal(serde_json::Value::String(body)))) => body,
                    Some(Ok(ConfigValue::EnvRef(_))) => {
                        return Err(ManifestError::InvalidDirective {
                            scope: scope.clone(),
                            message: format!("test #{index} cannot use an !env directive"),
                        })
                    }
                    Some(Err(message)) => {
                        return Err(ManifestError::InvalidDirective {
                            scope: scope.clone(),
                            message,
                        })
                    }
                    Some(Ok(ConfigValue::Literal(_))) | None => return Err(missing()),
                };

                if function.trim().is_empty() {
                    return Err(missing());
                }

                Ok(TestCase {
                    description: test.description,
                    function,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let references = self
            .references
            .into_iter()
            .enumerate()
            .map(|(index, reference)| {
                let source = match (reference.file_path.as_deref(), reference.content) {
                    (Some(file), _) if !file.trim().is_empty() => {
                        ReferenceSource::File(PathBuf::from(file))
                    }
                    (_, Some(content)) => ReferenceSource::Inline(content),
                    _ => {
                        return Err(ManifestError::EmptyReference {
                            benchmark: self.name.clone(),
                            index,
                        })
                    }
                };

                let workspace_path = match (reference.workspace_path, &source) {
                    (Some(p), _) if !p.trim().is_empty() => p,
                    (_, ReferenceSource::File(file)) => file
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .ok_or_else(|| ManifestError::Malformed {
                            path: path.to_path_buf(),
                            message: format!("reference #{index} of {scope} has no file name"),
                        })?,
                    (_, ReferenceSource::Inline(_)) => {
                        return Err(ManifestError::Malformed {
                            path: path.to_path_buf(),
                            message: format!(
                                "inline reference #{index} of {scope} needs a workspace_path"
                            ),
                        })
                    }
                };

                Ok(Reference {
                    source,
                    workspace_path,
                    required: reference.required,
                    read_only: reference.read_only,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let specs = self
            .specs
            .into_iter()
            .map(|s| Spec {
                description: s.description,
                precondition: s.precondition,
                postcondition: s.postcondition,
            })
            .collect();

        Ok(Benchmark {
            configs: convert_configs(self.configs, &scope, path)?,
            constants: convert_constants(self.constants, &scope)?,
            name: self.name,
            category: self.category,
            description: self.description,
            specs,
            tests,
            references,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> serde_yaml::Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_parse_env_directive() {
        let value = parse_value(yaml("!env JIRA_TOKEN")).unwrap();
        assert_eq!(value, ConfigValue::EnvRef("JIRA_TOKEN".to_string()));
    }

    #[test]
    fn test_parse_function_directive() {
        let value = parse_value(yaml("!function |\n  def check():\n      pass\n")).unwrap();
        match value {
            ConfigValue::FunctionBody(body) => assert!(body.contains("def check")),
            other => panic!("expected function body, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_unknown_tag_is_rejected() {
        assert!(parse_value(yaml("!secret foo")).is_err());
    }

    #[test]
    fn test_parse_literal_number() {
        assert_eq!(
            parse_value(yaml("30")).unwrap(),
            ConfigValue::Literal(serde_json::json!(30))
        );
    }

    #[test]
    fn test_env_and_value_conflict() {
        let docs = vec![ConfigDocument {
            name: "token".to_string(),
            description: String::new(),
            value: Some(yaml("abc")),
            env: Some("TOKEN".to_string()),
            required: false,
        }];
        let err = convert_configs(docs, "suite", Path::new("suite.yaml")).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidDirective { .. }));
    }

    #[test]
    fn test_reference_defaults_workspace_path_to_file_name() {
        let doc: BenchmarkDocument = serde_yaml::from_str(
            r#"
name: foobar
tests:
  - description: t
    function_to_run: "assert True"
references:
  - file_path: domains/core/foobar.py
"#,
        )
        .unwrap();
        let benchmark = doc.into_benchmark("core", Path::new("core.yaml")).unwrap();
        assert_eq!(benchmark.references[0].workspace_path, "foobar.py");
        assert!(benchmark.references[0].required);
        assert!(!benchmark.references[0].read_only);
    }
}
