//! @ai:module:intent Locate candidate modules in a workspace by their expected names
//! @ai:module:layer infrastructure
//! @ai:module:public_api ModuleLoader, WorkspaceModuleLoader, ModuleHandle
//! @ai:module:stateless true

use crate::error::LoadError;
use std::path::{Path, PathBuf};

/// @ai:intent A candidate module that exists in the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleHandle {
    pub name: String,
    pub path: PathBuf,
}

/// @ai:intent Capability lookup against candidate artifacts; failures are recoverable
pub trait ModuleLoader: Send + Sync {
    /// @ai:intent Resolve `module` inside `workspace`
    fn load(&self, workspace: &Path, module: &str) -> Result<ModuleHandle, LoadError>;
}

/// @ai:intent Resolves `<name>.<ext>` files or `<name>/` packages
pub struct WorkspaceModuleLoader {
    extension: &'static str,
    package_marker: Option<&'static str>,
}

impl WorkspaceModuleLoader {
    /// @ai:intent Loader for a runtime's module file extension
    /// @ai:effects pure
    pub fn new(extension: &'static str, package_marker: Option<&'static str>) -> Self {
        Self {
            extension,
            package_marker,
        }
    }
}

impl ModuleLoader for WorkspaceModuleLoader {
    fn load(&self, workspace: &Path, module: &str) -> Result<ModuleHandle, LoadError> {
        let valid = !module.is_empty()
            && module
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'));
        if !valid {
            return Err(LoadError::InvalidModuleName(module.to_string()));
        }

        let relative: PathBuf = module.split('.').collect();
        let file = workspace.join(&relative).with_extension(self.extension);

        if file.is_file() {
            return Ok(ModuleHandle {
                name: module.to_string(),
                path: file,
            });
        }

        if let Some(marker) = self.package_marker {
            let package = workspace.join(&relative);
            if package.join(marker).is_file() {
                return Ok(ModuleHandle {
                    name: module.to_string(),
                    path: package,
                });
            }
        }

        Err(LoadError::ModuleNotFound {
            module: module.to_string(),
            workspace: workspace.to_path_buf(),
        })
    }
}
