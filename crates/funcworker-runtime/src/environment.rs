//! Function-app environment and one-time unit setup.

use std::path::{Path, PathBuf};

use funcworker_core::{FunctionMetadata, WorkerError, WorkerResult};
use tracing::debug;

/// Well-known paths resolved from the first function load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEnvironment {
    /// Root of the function app: the parent of a function's directory.
    pub function_app_root: PathBuf,
    /// Startup profile, if one exists in the root.
    pub profile_path: Option<PathBuf>,
}

impl WorkerEnvironment {
    /// Resolve the environment from a loaded function.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::LoadError`] if the function directory has no
    /// parent.
    pub fn resolve(metadata: &FunctionMetadata, profile_file_name: &str) -> WorkerResult<Self> {
        let root = metadata
            .directory
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                WorkerError::load(
                    &metadata.function_id,
                    format!(
                        "function directory '{}' has no parent",
                        metadata.directory.display()
                    ),
                )
            })?;
        Ok(Self::from_root(root, profile_file_name))
    }

    /// Build the environment for a known function-app root.
    #[must_use]
    pub fn from_root(root: &Path, profile_file_name: &str) -> Self {
        let candidate = root.join(profile_file_name);
        let profile_path = candidate.is_file().then_some(candidate);
        debug!(
            root = %root.display(),
            profile = ?profile_path,
            "resolved function app environment"
        );
        Self {
            function_app_root: root.to_path_buf(),
            profile_path,
        }
    }
}

/// A type alias registered with the engine during one-time setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAlias {
    /// Short name.
    pub alias: String,
    /// Target type name.
    pub target: String,
}

/// One-time setup passed to the engine factory and to every new unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSetup {
    /// Resolved function-app environment.
    pub environment: WorkerEnvironment,
    /// Type aliases to register.
    pub type_aliases: Vec<TypeAlias>,
}

impl UnitSetup {
    /// Create a setup with no capability registrations.
    #[must_use]
    pub fn new(environment: WorkerEnvironment) -> Self {
        Self {
            environment,
            type_aliases: Vec::new(),
        }
    }

    /// Add type aliases.
    #[must_use]
    pub fn with_type_aliases(mut self, aliases: impl IntoIterator<Item = TypeAlias>) -> Self {
        self.type_aliases.extend(aliases);
        self
    }
}
