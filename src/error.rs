//! @ai:module:intent Error taxonomy for manifest loading, resolution, staging and sandboxing
//! @ai:module:layer domain
//! @ai:module:public_api ManifestError, ConfigResolutionError, MaterializationError, LoadError, SandboxError, InvalidTransition, SelectionError
//! @ai:module:stateless true

use std::path::PathBuf;
use thiserror::Error;

/// @ai:intent Malformed or duplicate manifest definitions; fatal for the whole run
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("Duplicate domain '{name}' declared in {first} and {second}")]
    DuplicateDomain {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Duplicate benchmark '{benchmark}' in domain '{domain}'")]
    DuplicateBenchmark { domain: String, benchmark: String },

    #[error("Duplicate config '{name}' in {scope}")]
    DuplicateConfig { scope: String, name: String },

    #[error("Test #{index} of benchmark '{benchmark}' has no validation function")]
    MissingValidationFunction { benchmark: String, index: usize },

    #[error("Reference #{index} of benchmark '{benchmark}' declares neither file_path nor content")]
    EmptyReference { benchmark: String, index: usize },

    #[error("Invalid directive in {scope}: {message}")]
    InvalidDirective { scope: String, message: String },
}

/// @ai:intent Effective configuration could not be produced for one benchmark
/// @ai:constraint messages name configs and variables, never resolved values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigResolutionError {
    #[error("Config '{config}' requires environment variable '{variable}', which is not set")]
    MissingEnvironment { config: String, variable: String },

    #[error("Test #{test} of benchmark '{benchmark}' references undefined config '{name}'")]
    UndefinedReference {
        benchmark: String,
        test: usize,
        name: String,
    },

    #[error("Config '{name}' is not defined")]
    Undefined { name: String },

    #[error("Config '{name}' is defined but resolved to absent")]
    Absent { name: String },

    #[error("Constant '{name}' must be {expected}")]
    InvalidConstant { name: String, expected: &'static str },
}

/// @ai:intent Workspace could not be staged for one benchmark
#[derive(Error, Debug)]
pub enum MaterializationError {
    #[error("Required reference {source_path} for benchmark '{benchmark}' does not exist")]
    MissingRequired {
        benchmark: String,
        source_path: PathBuf,
    },

    #[error("Workspace path '{path}' of benchmark '{benchmark}' escapes the workspace")]
    PathEscape { benchmark: String, path: String },

    #[error("Failed to stage {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// @ai:intent Candidate module lookup failed; always recoverable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("No module named '{module}' in workspace {workspace}")]
    ModuleNotFound { module: String, workspace: PathBuf },

    #[error("Invalid module name '{0}'")]
    InvalidModuleName(String),
}

/// @ai:intent Infrastructure failure while driving a sandboxed child process
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode sandbox payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// @ai:intent The requested domain or benchmark does not exist
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("Unknown benchmark '{benchmark}' in domain '{domain}'")]
    UnknownBenchmark { domain: String, benchmark: String },
}

/// @ai:intent A test lifecycle step that its current state does not allow
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Cannot {action} a test that is {from}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub action: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_environment_message_names_variable_only() {
        let err = ConfigResolutionError::MissingEnvironment {
            config: "api_token".to_string(),
            variable: "JIRA_TOKEN".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("api_token"));
        assert!(message.contains("JIRA_TOKEN"));
    }

    #[test]
    fn test_duplicate_benchmark_message() {
        let err = ManifestError::DuplicateBenchmark {
            domain: "core".to_string(),
            benchmark: "hello".to_string(),
        };
        assert_eq!(err.to_string(), "Duplicate benchmark 'hello' in domain 'core'");
    }
}
