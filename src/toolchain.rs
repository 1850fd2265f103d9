//! @ai:module:intent Validate that the candidate runtime's interpreter is runnable
//! @ai:module:layer infrastructure
//! @ai:module:public_api ToolchainValidator, ToolchainStatus
//! @ai:module:stateless true

use crate::config::RuntimeKind;
use crate::sandbox::CandidateRuntime;
use std::process::Command;

/// @ai:intent Status of toolchain validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainStatus {
    pub runtime: RuntimeKind,
    pub program: String,
    pub available: bool,
    pub install_hint: &'static str,
}

/// @ai:intent Validates that required tools are installed
pub struct ToolchainValidator;

impl ToolchainValidator {
    /// @ai:intent Get install hint for a runtime
    /// @ai:effects pure
    fn get_install_hint(runtime: RuntimeKind) -> &'static str {
        match runtime {
            RuntimeKind::Python => "Install Python: https://www.python.org/downloads/",
            RuntimeKind::Shell => "Install a POSIX shell (dash, bash or busybox sh)",
        }
    }

    /// @ai:intent Check if a command runs successfully with the given arguments
    /// @ai:effects io
    fn is_tool_available(tool: &str, args: &[&str]) -> bool {
        Command::new(tool)
            .args(args)
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// @ai:intent Check if a program answers `--version`
    /// @ai:effects io
    pub fn is_available(program: &str) -> bool {
        Self::is_tool_available(program, &["--version"])
    }

    /// @ai:intent Probe the interpreter a runtime would spawn
    /// @ai:effects io
    pub fn validate(runtime: &dyn CandidateRuntime) -> ToolchainStatus {
        let program = runtime.program().to_string();
        let available = Self::is_tool_available(&program, &runtime.version_args());

        ToolchainStatus {
            runtime: runtime.kind(),
            program,
            available,
            install_hint: Self::get_install_hint(runtime.kind()),
        }
    }

    /// @ai:intent Log a warning when the interpreter is missing
    /// @ai:effects io
    pub fn log_warnings(status: &ToolchainStatus) {
        if !status.available {
            tracing::warn!(
                "Interpreter '{}' not found - every {} test will error. {}",
                status.program,
                status.runtime,
                status.install_hint
            );
        }
    }
}
