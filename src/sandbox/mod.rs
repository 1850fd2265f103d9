//! @ai:module:intent Run one validation function against candidate artifacts in a killable child process
//! @ai:module:layer infrastructure
//! @ai:module:public_api ExecutionSandbox, AttemptOutcome, OutcomeKind, CandidateRuntime, ModuleLoader

pub mod loader;
pub mod outcome;
pub mod runtime;

pub use loader::{ModuleHandle, ModuleLoader, WorkspaceModuleLoader};
pub use outcome::{AttemptOutcome, OutcomeKind};
pub use runtime::{
    runtime_for, CandidateRuntime, EntryPoint, Invocation, PreparedCommand, PythonRuntime,
    ShellRuntime,
};

use crate::config::SandboxConfig;
use crate::context::ExecutionContext;
use crate::error::SandboxError;
use crate::resolver::ResolvedTest;
use outcome::{parse_report, tail};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
const STDERR_TAIL_LINES: usize = 5;

/// @ai:intent Executes validation functions under isolation and a wall-clock deadline
pub struct ExecutionSandbox {
    runtime: Arc<dyn CandidateRuntime>,
    loader: Arc<dyn ModuleLoader>,
    candidate_modules: Vec<String>,
    max_output_bytes: usize,
}

impl ExecutionSandbox {
    /// @ai:intent Create a sandbox from explicit collaborators
    /// @ai:effects pure
    pub fn new(
        runtime: Arc<dyn CandidateRuntime>,
        loader: Arc<dyn ModuleLoader>,
        candidate_modules: Vec<String>,
        max_output_bytes: usize,
    ) -> Self {
        Self {
            runtime,
            loader,
            candidate_modules,
            max_output_bytes,
        }
    }

    /// @ai:intent Create a sandbox for the configured runtime
    /// @ai:effects pure
    pub fn from_config(config: &SandboxConfig) -> Self {
        let runtime = runtime_for(config);
        let loader = Arc::new(WorkspaceModuleLoader::new(
            runtime.module_extension(),
            runtime.package_marker(),
        ));
        Self::new(
            runtime,
            loader,
            config.candidate_modules.clone(),
            config.max_output_bytes,
        )
    }

    pub fn runtime(&self) -> &dyn CandidateRuntime {
        self.runtime.as_ref()
    }

    /// @ai:intent Run one attempt of one test; never panics on candidate behaviour
    /// @ai:pre workspace is fully materialized
    /// @ai:effects fs:write, io
    pub async fn execute(
        &self,
        test: &ResolvedTest,
        context: &ExecutionContext,
        workspace: &Path,
        timeout: Duration,
    ) -> AttemptOutcome {
        let start = Instant::now();
        let source = test.function.source.as_str();

        for module in self.runtime.imported_modules(source) {
            if !self.candidate_modules.contains(&module) {
                continue;
            }
            if let Err(e) = self.loader.load(workspace, &module) {
                tracing::debug!("Test #{} cannot load candidate module: {}", test.index, e);
                return AttemptOutcome::new(
                    OutcomeKind::Import,
                    format!("ImportError: {e}"),
                    start.elapsed(),
                );
            }
        }

        // Per-attempt HOME/TMPDIR, so nothing an attempt writes outside the
        // workspace is visible to the next one.
        let scratch = match TempDir::new() {
            Ok(dir) => dir,
            Err(e) => {
                return AttemptOutcome::new(
                    OutcomeKind::Infrastructure,
                    format!("cannot create scratch directory: {e}"),
                    start.elapsed(),
                )
            }
        };

        let invocation = Invocation {
            source,
            context,
            workspace,
        };

        let result = match self.runtime.prepare(scratch.path(), &invocation) {
            Ok(prepared) => {
                self.spawn_and_wait(prepared, workspace, scratch.path(), timeout, start)
                    .await
            }
            Err(e) => Err(e),
        };

        result.unwrap_or_else(|e| {
            tracing::warn!("Sandbox infrastructure failure: {}", e);
            AttemptOutcome::new(OutcomeKind::Infrastructure, e.to_string(), start.elapsed())
        })
    }

    /// @ai:intent Drive the child to completion or kill it at the deadline
    /// @ai:effects io
    async fn spawn_and_wait(
        &self,
        prepared: PreparedCommand,
        workspace: &Path,
        scratch: &Path,
        timeout: Duration,
        start: Instant,
    ) -> Result<AttemptOutcome, SandboxError> {
        let mut command = Command::new(&prepared.program);
        command
            .args(&prepared.args)
            .current_dir(workspace)
            .env_clear()
            .env(
                "PATH",
                std::env::var("PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string()),
            )
            .env("LANG", "C.UTF-8")
            .env("HOME", scratch)
            .env("TMPDIR", scratch)
            .envs(prepared.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if prepared.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| SandboxError::Spawn {
            program: prepared.program.clone(),
            source,
        })?;
        let group = child.id();
        let deadline = tokio::time::Instant::from_std(start) + timeout;

        let limit = self.max_output_bytes;
        let mut stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(read_capped(out, limit)));
        let mut stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(read_capped(err, limit)));
        let stdin = child.stdin.take();
        let payload = prepared.stdin;

        let run = async {
            if let (Some(mut pipe), Some(bytes)) = (stdin, payload) {
                // A child that exits before reading closes the pipe; that is not our failure.
                let _ = pipe.write_all(&bytes).await;
                drop(pipe);
            }
            child.wait().await
        };

        let waited = tokio::time::timeout_at(deadline, run).await;

        // Background processes the candidate started share the group and would
        // otherwise hold the output pipes open.
        kill_group(group);

        let status = match waited {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                for task in [stdout_task, stderr_task].into_iter().flatten() {
                    task.abort();
                }
                return Ok(timed_out(timeout, start));
            }
        };

        let output = tokio::time::timeout_at(deadline, async {
            let stdout = collect(&mut stdout_task).await;
            let stderr = collect(&mut stderr_task).await;
            (stdout, stderr)
        })
        .await;

        let (stdout, stderr) = match output {
            Ok(output) => output,
            Err(_) => {
                for task in [stdout_task, stderr_task].into_iter().flatten() {
                    task.abort();
                }
                return Ok(timed_out(timeout, start));
            }
        };
        let duration = start.elapsed();

        let outcome = match parse_report(&stdout) {
            Some(report) => {
                let kind = match report.kind {
                    OutcomeKind::Timeout | OutcomeKind::Infrastructure => OutcomeKind::Exception,
                    kind => kind,
                };
                AttemptOutcome::new(kind, report.message, duration)
            }
            None if !status.success() => {
                let detail = tail(&stderr, STDERR_TAIL_LINES);
                AttemptOutcome::new(
                    OutcomeKind::Exception,
                    if detail.is_empty() {
                        format!("process exited with {status}")
                    } else {
                        format!("process exited with {status}: {detail}")
                    },
                    duration,
                )
            }
            None => AttemptOutcome::new(
                OutcomeKind::Exception,
                "process exited without reporting an outcome",
                duration,
            ),
        };

        Ok(outcome)
    }
}

async fn collect(task: &mut Option<tokio::task::JoinHandle<String>>) -> String {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

fn timed_out(timeout: Duration, start: Instant) -> AttemptOutcome {
    AttemptOutcome::new(
        OutcomeKind::Timeout,
        format!("timed out after {:.1}s", timeout.as_secs_f64()),
        start.elapsed(),
    )
}

/// @ai:intent SIGKILL every process left in the attempt's process group
/// @ai:effects io
#[cfg(unix)]
fn kill_group(group: Option<u32>) {
    if let Some(pgid) = group.and_then(|id| libc::pid_t::try_from(id).ok()) {
        // The group was created for this attempt by `process_group(0)`; ESRCH
        // just means nothing is left in it.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_group: Option<u32>) {}

/// @ai:intent Drain a pipe, keeping only its last `limit` bytes
/// @ai:effects io
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut kept: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                kept.extend_from_slice(&chunk[..n]);
                if kept.len() > limit {
                    let excess = kept.len() - limit;
                    kept.drain(..excess);
                }
            }
        }
    }

    String::from_utf8_lossy(&kept).into_owned()
}
