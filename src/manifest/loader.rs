//! @ai:module:intent YAML manifest loader for suites and domains
//! @ai:module:layer infrastructure
//! @ai:module:public_api ManifestLoader, ManifestLoaderTrait
//! @ai:module:stateless true

use crate::error::ManifestError;
use crate::manifest::model::{
    convert_configs, convert_constants, Domain, DomainDocument, Suite, SuiteDocument,
};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// @ai:intent Trait for loading the benchmark catalog
pub trait ManifestLoaderTrait: Send + Sync {
    /// @ai:intent Load a suite root document and every domain it covers
    fn load_suite(&self, suite_path: &Path) -> Result<Suite, ManifestError>;

    /// @ai:intent Load a single domain document
    fn load_domain(&self, domain_path: &Path) -> Result<Domain, ManifestError>;
}

/// @ai:intent Loads manifests from YAML documents; never opens reference files
/// @ai:effects pure (stateless)
pub struct ManifestLoader;

impl ManifestLoader {
    /// @ai:intent Create a new manifest loader
    /// @ai:effects pure
    pub fn new() -> Self {
        Self
    }

    /// @ai:intent Read and deserialize one manifest document
    /// @ai:effects fs:read
    fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse_document(&content, path)
    }

    /// @ai:intent Deserialize manifest text
    /// @ai:effects pure
    fn parse_document<T: DeserializeOwned>(content: &str, path: &Path) -> Result<T, ManifestError> {
        serde_yaml::from_str(content).map_err(|e| ManifestError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// @ai:intent Find all YAML documents below a directory, sorted for determinism
    /// @ai:effects fs:read
    fn find_domain_files(domains_dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(domains_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.path().to_path_buf())
            .collect();

        files.sort();
        files
    }

    /// @ai:intent Build a domain from already-parsed document text
    /// @ai:effects pure
    pub fn parse_domain(&self, content: &str, path: &Path) -> Result<Domain, ManifestError> {
        let doc: DomainDocument = Self::parse_document(content, path)?;
        Self::build_domain(doc, path)
    }

    /// @ai:intent Validate a raw domain document
    /// @ai:effects pure
    fn build_domain(doc: DomainDocument, path: &Path) -> Result<Domain, ManifestError> {
        if doc.name.trim().is_empty() {
            return Err(ManifestError::Malformed {
                path: path.to_path_buf(),
                message: "domain without a name".to_string(),
            });
        }

        let scope = format!("domain '{}'", doc.name);
        let mut seen = HashSet::new();
        let mut benchmarks = Vec::with_capacity(doc.benchmarks.len());

        for raw in doc.benchmarks {
            if !seen.insert(raw.name.clone()) {
                return Err(ManifestError::DuplicateBenchmark {
                    domain: doc.name.clone(),
                    benchmark: raw.name,
                });
            }
            benchmarks.push(raw.into_benchmark(&doc.name, path)?);
        }

        Ok(Domain {
            constants: convert_constants(doc.constants, &scope)?,
            configs: convert_configs(doc.configs, &scope, path)?,
            name: doc.name,
            description: doc.description,
            benchmarks,
            source: path.to_path_buf(),
        })
    }

    /// @ai:intent Resolve which domain documents belong to a suite
    /// @ai:effects fs:read
    fn domain_paths(doc: &SuiteDocument, root: &Path, suite_path: &Path) -> Vec<PathBuf> {
        if !doc.domains.is_empty() {
            return doc.domains.iter().map(|p| root.join(p)).collect();
        }

        let domains_dir = root.join(
            doc.domains_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("domains")),
        );

        Self::find_domain_files(&domains_dir)
            .into_iter()
            .filter(|p| p.as_path() != suite_path)
            .collect()
    }
}

impl Default for ManifestLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestLoaderTrait for ManifestLoader {
    /// @ai:intent Load the suite and all of its domains
    /// @ai:effects fs:read
    fn load_suite(&self, suite_path: &Path) -> Result<Suite, ManifestError> {
        let doc: SuiteDocument = Self::read_document(suite_path)?;

        if doc.name.trim().is_empty() {
            return Err(ManifestError::Malformed {
                path: suite_path.to_path_buf(),
                message: "suite without a name".to_string(),
            });
        }

        let root = suite_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut origins: HashMap<String, PathBuf> = HashMap::new();
        let mut domains = Vec::new();

        for path in Self::domain_paths(&doc, &root, suite_path) {
            let domain = self.load_domain(&path)?;

            if let Some(first) = origins.get(&domain.name) {
                return Err(ManifestError::DuplicateDomain {
                    name: domain.name,
                    first: first.clone(),
                    second: path,
                });
            }

            tracing::debug!(
                "Loaded domain {} ({} benchmarks) from {}",
                domain.name,
                domain.benchmarks.len(),
                path.display()
            );
            origins.insert(domain.name.clone(), path);
            domains.push(domain);
        }

        domains.sort_by(|a, b| a.name.cmp(&b.name));

        let scope = format!("suite '{}'", doc.name);
        let suite = Suite {
            constants: convert_constants(doc.constants, &scope)?,
            configs: convert_configs(doc.configs, &scope, suite_path)?,
            name: doc.name,
            description: doc.description,
            domains,
            root,
        };

        tracing::info!(
            "Loaded suite {} with {} domains and {} benchmarks",
            suite.name,
            suite.domains.len(),
            suite.benchmark_count()
        );
        Ok(suite)
    }

    /// @ai:intent Load one domain document
    /// @ai:effects fs:read
    fn load_domain(&self, domain_path: &Path) -> Result<Domain, ManifestError> {
        let doc: DomainDocument = Self::read_document(domain_path)?;
        Self::build_domain(doc, domain_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::model::{ConfigValue, ReferenceSource};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_document(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    const SUITE: &str = r#"
name: zerg
constants:
  timeout_seconds: 30
  max_retries: 2
configs:
  - name: base_url
    value: https://example.invalid
"#;

    const CORE: &str = r#"
name: core
description: Core benchmarks
benchmarks:
  - name: hello
    category: python
    description: Print hello world
    specs:
      - description: greets
        pre: nothing
        post: returns greeting
    tests:
      - description: exact greeting
        function_to_run: !function |
          def test_hello():
              from main import hello_world
              assert hello_world() == "Hello World"
    references:
      - file_path: domains/core/foobar.py
        workspace_path: foobar.py
        read_only: true
    configs:
      - name: api_token
        value: !env ZERG_TEST_TOKEN
        required: true
"#;

    #[test]
    fn test_load_suite_discovers_domains() {
        let temp = TempDir::new().unwrap();
        create_document(temp.path(), "suite.yaml", SUITE);
        create_document(temp.path(), "domains/core/core.yaml", CORE);
        create_document(
            temp.path(),
            "domains/test/test.yaml",
            "name: test\nbenchmarks: []\n",
        );

        let suite = ManifestLoader::new()
            .load_suite(&temp.path().join("suite.yaml"))
            .unwrap();

        assert_eq!(suite.name, "zerg");
        assert_eq!(suite.domains.len(), 2);
        assert_eq!(suite.domains[0].name, "core");
        assert_eq!(suite.constants["timeout_seconds"], serde_json::json!(30));

        let hello = suite.domain("core").unwrap().benchmark("hello").unwrap();
        assert_eq!(hello.tests.len(), 1);
        assert!(hello.tests[0].function.contains("def test_hello"));
        assert_eq!(
            hello.references[0].source,
            ReferenceSource::File(PathBuf::from("domains/core/foobar.py"))
        );
        assert!(hello.references[0].read_only);
        assert_eq!(
            hello.configs[0].value,
            ConfigValue::EnvRef("ZERG_TEST_TOKEN".to_string())
        );
        assert_eq!(hello.specs[0].precondition.as_deref(), Some("nothing"));
    }

    #[test]
    fn test_explicit_domain_list() {
        let temp = TempDir::new().unwrap();
        create_document(
            temp.path(),
            "suite.yaml",
            "name: zerg\ndomains:\n  - extra/core.yaml\n",
        );
        create_document(temp.path(), "extra/core.yaml", CORE);
        create_document(temp.path(), "domains/ignored.yaml", "name: ignored\n");

        let suite = ManifestLoader::new()
            .load_suite(&temp.path().join("suite.yaml"))
            .unwrap();
        assert_eq!(suite.domains.len(), 1);
        assert_eq!(suite.domains[0].name, "core");
    }

    #[test]
    fn test_duplicate_benchmark_is_rejected() {
        let content = r#"
name: core
benchmarks:
  - name: hello
    tests: [{ description: a, function_to_run: "assert True" }]
  - name: hello
    tests: [{ description: b, function_to_run: "assert True" }]
"#;
        let err = ManifestLoader::new()
            .parse_domain(content, Path::new("core.yaml"))
            .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateBenchmark { .. }));
    }

    #[test]
    fn test_duplicate_domain_is_rejected() {
        let temp = TempDir::new().unwrap();
        create_document(temp.path(), "suite.yaml", "name: zerg\n");
        create_document(temp.path(), "domains/a.yaml", "name: core\n");
        create_document(temp.path(), "domains/b.yaml", "name: core\n");

        let err = ManifestLoader::new()
            .load_suite(&temp.path().join("suite.yaml"))
            .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateDomain { .. }));
    }

    #[test]
    fn test_test_without_function_is_rejected() {
        let content = r#"
name: core
benchmarks:
  - name: hello
    tests:
      - description: nothing to run
"#;
        let err = ManifestLoader::new()
            .parse_domain(content, Path::new("core.yaml"))
            .unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingValidationFunction { index: 0, .. }
        ));
    }

    #[test]
    fn test_reference_without_source_is_rejected() {
        let content = r#"
name: core
benchmarks:
  - name: hello
    references:
      - workspace_path: main.py
"#;
        let err = ManifestLoader::new()
            .parse_domain(content, Path::new("core.yaml"))
            .unwrap_err();
        assert!(matches!(err, ManifestError::EmptyReference { index: 0, .. }));
    }

    #[test]
    fn test_malformed_document() {
        let err = ManifestLoader::new()
            .parse_domain("benchmarks: [", Path::new("core.yaml"))
            .unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { .. }));
    }

    #[test]
    fn test_missing_suite_file() {
        let temp = TempDir::new().unwrap();
        let err = ManifestLoader::new()
            .load_suite(&temp.path().join("absent.yaml"))
            .unwrap_err();
        assert!(matches!(err, ManifestError::Read { .. }));
    }
}
