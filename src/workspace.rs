//! @ai:module:intent Stage candidate artifacts and declared references into an isolated workspace
//! @ai:module:layer infrastructure
//! @ai:module:public_api WorkspaceMaterializer, Workspace
//! @ai:module:stateless true

use crate::error::MaterializationError;
use crate::manifest::{Reference, ReferenceSource};
use crate::resolver::ResolvedBenchmark;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use walkdir::WalkDir;

/// @ai:intent A fully staged workspace; removed on drop unless kept
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    /// Optional references that were missing at staging time
    pub warnings: Vec<String>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// @ai:intent Leave the directory on disk after the run
    /// @ai:effects fs:write
    pub fn keep(mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            // The directory stays on disk; TempDir no longer owns it.
            let _ = dir.into_path();
        }
        self.path.clone()
    }
}

/// @ai:intent Creates one workspace per benchmark execution
pub struct WorkspaceMaterializer {
    /// Directory reference file paths are resolved against
    source_root: PathBuf,
    /// Parent of every workspace; system temp dir when None
    workspace_root: Option<PathBuf>,
    candidate_dir: PathBuf,
}

impl WorkspaceMaterializer {
    /// @ai:intent Create a materializer
    /// @ai:effects pure
    pub fn new(
        source_root: PathBuf,
        workspace_root: Option<PathBuf>,
        candidate_dir: PathBuf,
    ) -> Self {
        Self {
            source_root,
            workspace_root,
            candidate_dir,
        }
    }

    /// @ai:intent Stage candidate files and references; partial workspaces are discarded
    /// @ai:pre none of the benchmark's tests has started
    /// @ai:effects fs:read, fs:write
    pub fn materialize(
        &self,
        benchmark: &ResolvedBenchmark,
    ) -> Result<Workspace, MaterializationError> {
        let staged = self.plan(benchmark)?;

        let prefix = format!("{}-{}-", sanitize(&benchmark.domain), sanitize(&benchmark.name));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let root = self
            .workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&root).map_err(|source| MaterializationError::Io {
            path: root.clone(),
            source,
        })?;
        let dir = builder
            .tempdir_in(&root)
            .map_err(|source| MaterializationError::Io {
                path: root.clone(),
                source,
            })?;

        // `dir` is dropped on any early return below, so no partial workspace survives.
        if let Some((candidate, recursive)) = self.candidate_source(benchmark) {
            copy_tree(&candidate, dir.path(), recursive)?;
            tracing::debug!(
                "Copied candidate artifacts from {} for {}",
                candidate.display(),
                benchmark.id()
            );
        }

        for (reference, target, source) in &staged.present {
            let destination = dir.path().join(target);

            if destination.exists() {
                tracing::warn!(
                    "Reference {} overrides candidate file in {}",
                    reference.workspace_path,
                    benchmark.id()
                );
                make_writable(&destination)?;
            }

            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent).map_err(|source| MaterializationError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }

            match source {
                StagedSource::File(path) => {
                    std::fs::copy(path, &destination).map_err(|source| {
                        MaterializationError::Io {
                            path: path.clone(),
                            source,
                        }
                    })?;
                }
                StagedSource::Inline(content) => {
                    std::fs::write(&destination, content).map_err(|source| {
                        MaterializationError::Io {
                            path: destination.clone(),
                            source,
                        }
                    })?;
                }
            }

            if reference.read_only {
                set_read_only(&destination)?;
            }
        }

        for warning in &staged.warnings {
            tracing::warn!("{}: {}", benchmark.id(), warning);
        }

        let path = dir.path().to_path_buf();
        tracing::debug!("Materialized workspace {} for {}", path.display(), benchmark.id());

        Ok(Workspace {
            dir: Some(dir),
            path,
            warnings: staged.warnings,
        })
    }

    /// @ai:intent Validate every reference before any file is written
    /// @ai:effects fs:read
    fn plan<'a>(
        &self,
        benchmark: &'a ResolvedBenchmark,
    ) -> Result<StagingPlan<'a>, MaterializationError> {
        let mut present = Vec::new();
        let mut warnings = Vec::new();

        for reference in &benchmark.references {
            let target = workspace_target(&reference.workspace_path).ok_or_else(|| {
                MaterializationError::PathEscape {
                    benchmark: benchmark.id(),
                    path: reference.workspace_path.clone(),
                }
            })?;

            let source = match &reference.source {
                ReferenceSource::Inline(content) => StagedSource::Inline(content.as_str()),
                ReferenceSource::File(path) => {
                    let full = self.source_root.join(path);

                    if !full.is_file() {
                        if reference.required {
                            return Err(MaterializationError::MissingRequired {
                                benchmark: benchmark.id(),
                                source_path: path.clone(),
                            });
                        }
                        warnings.push(format!(
                            "optional reference {} not found, skipped",
                            path.display()
                        ));
                        continue;
                    }
                    StagedSource::File(full)
                }
            };

            present.push((reference, target, source));
        }

        Ok(StagingPlan { present, warnings })
    }

    /// @ai:intent First existing candidate directory for a benchmark, and whether to copy its subtree
    /// @ai:effects fs:read
    fn candidate_source(&self, benchmark: &ResolvedBenchmark) -> Option<(PathBuf, bool)> {
        [
            (self.candidate_dir.join(&benchmark.domain).join(&benchmark.name), true),
            (self.candidate_dir.join(&benchmark.name), true),
            // The shared root also holds other benchmarks' directories: top-level files only
            (self.candidate_dir.clone(), false),
        ]
        .into_iter()
        .find(|(p, _)| p.is_dir())
    }
}

enum StagedSource<'a> {
    File(PathBuf),
    Inline(&'a str),
}

struct StagingPlan<'a> {
    present: Vec<(&'a Reference, PathBuf, StagedSource<'a>)>,
    warnings: Vec<String>,
}

/// @ai:intent Relative workspace path, or None if it could leave the workspace
/// @ai:effects pure
fn workspace_target(workspace_path: &str) -> Option<PathBuf> {
    let path = Path::new(workspace_path);
    let mut target = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if target.as_os_str().is_empty() {
        None
    } else {
        Some(target)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// @ai:intent Copy a directory's files, descending into subdirectories only when `recursive`
/// @ai:effects fs:read, fs:write
fn copy_tree(from: &Path, to: &Path, recursive: bool) -> Result<(), MaterializationError> {
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source| MaterializationError::Io { path, source }
    };

    let walker = if recursive {
        WalkDir::new(from)
    } else {
        WalkDir::new(from).max_depth(1)
    };

    for entry in walker {
        let entry = entry.map_err(|e| MaterializationError::Io {
            path: e.path().unwrap_or(from).to_path_buf(),
            source: e.into(),
        })?;
        let relative = match entry.path().strip_prefix(from) {
            Ok(r) if !r.as_os_str().is_empty() => r,
            _ => continue,
        };
        let destination = to.join(relative);

        if entry.file_type().is_dir() {
            if !recursive {
                continue;
            }
            std::fs::create_dir_all(&destination).map_err(io(&destination))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent).map_err(io(parent))?;
            }
            std::fs::copy(entry.path(), &destination).map_err(io(entry.path()))?;
        }
    }

    Ok(())
}

fn set_read_only(path: &Path) -> Result<(), MaterializationError> {
    let io = |source| MaterializationError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut permissions = std::fs::metadata(path).map_err(io)?.permissions();
    permissions.set_readonly(true);
    std::fs::set_permissions(path, permissions).map_err(io)
}

#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(path: &Path) -> Result<(), MaterializationError> {
    let io = |source| MaterializationError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut permissions = std::fs::metadata(path).map_err(io)?.permissions();
    if permissions.readonly() {
        permissions.set_readonly(false);
        std::fs::set_permissions(path, permissions).map_err(io)?;
    }
    Ok(())
}
