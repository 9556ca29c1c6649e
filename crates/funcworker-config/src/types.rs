//! Configuration types for the worker.
//!
//! Every struct implements [`Default`] with the same values as the embedded
//! `defaults.toml`, so a bare `[section]` header in TOML produces a working
//! configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level WorkerConfig
// ---------------------------------------------------------------------------

/// Root configuration for the worker process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Execution unit pool sizing.
    pub pool: PoolSection,
    /// How invocations are scheduled.
    pub dispatch: DispatchSection,
    /// Startup environment and capability registrations.
    pub environment: EnvironmentSection,
    /// Logging level, format, and per-crate directives.
    pub logging: LoggingSection,
}

// ---------------------------------------------------------------------------
// PoolSection
// ---------------------------------------------------------------------------

/// Execution unit pool limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    /// Maximum number of execution units. Units are created lazily.
    pub size: usize,
    /// How long a checkout waits for a free unit. `0` waits forever.
    pub checkout_timeout_ms: u64,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            size: 1,
            checkout_timeout_ms: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchSection
// ---------------------------------------------------------------------------

/// Invocation scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// `"sequential"` or `"concurrent"`.
    pub mode: String,
    /// Concurrent mode: invocations admitted at once, waiting or running.
    /// At the limit the dispatcher stops reading until one finishes.
    pub max_in_flight: usize,
}

/// Default for [`DispatchSection::max_in_flight`].
pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Sequential.to_string(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl DispatchSection {
    /// Parsed dispatch mode, if the configured name is known.
    #[must_use]
    pub fn parsed_mode(&self) -> Option<DispatchMode> {
        self.mode.parse().ok()
    }
}

/// How the dispatcher schedules invocation requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DispatchMode {
    /// Each response is written before the next message is read.
    #[default]
    Sequential,
    /// Invocations run on their own tasks, bounded by pool capacity.
    Concurrent,
}

impl DispatchMode {
    /// Config name of the mode.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            other => Err(format!("unknown dispatch mode '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// EnvironmentSection
// ---------------------------------------------------------------------------

/// Function-app environment and engine capability registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentSection {
    /// Startup profile looked up in the function-app root.
    pub profile_file_name: String,
    /// Capabilities advertised to the host on worker init.
    pub capabilities: BTreeMap<String, String>,
    /// Type aliases registered once when the pool initializes.
    pub type_aliases: Vec<TypeAliasEntry>,
}

impl Default for EnvironmentSection {
    fn default() -> Self {
        Self {
            profile_file_name: "profile".to_owned(),
            capabilities: BTreeMap::new(),
            type_aliases: Vec::new(),
        }
    }
}

/// One `alias -> target` type registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAliasEntry {
    /// Short name visible to function code.
    pub alias: String,
    /// Fully qualified target type name.
    pub target: String,
}

// ---------------------------------------------------------------------------
// LoggingSection
// ---------------------------------------------------------------------------

/// Logging and tracing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Global log level filter (`"trace"`, `"debug"`, `"info"`, `"warn"`,
    /// `"error"`).
    pub level: String,
    /// Output format: `"pretty"`, `"compact"`, `"json"`, or `"full"`.
    pub format: String,
    /// Per-crate tracing directives (e.g. `["funcworker_runtime=debug"]`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "compact".to_owned(),
            directives: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_sections_use_defaults() {
        let config: WorkerConfig = toml::from_str("[pool]\n[dispatch]\n").unwrap();
        assert_eq!(config, WorkerConfig::default());
    }

    #[test]
    fn test_dispatch_mode_parse() {
        assert_eq!(
            "Concurrent".parse::<DispatchMode>().unwrap(),
            DispatchMode::Concurrent
        );
        assert!("parallel".parse::<DispatchMode>().is_err());
        assert_eq!(
            DispatchSection::default().parsed_mode(),
            Some(DispatchMode::Sequential)
        );
    }

    #[test]
    fn test_type_aliases_parse() {
        let config: WorkerConfig = toml::from_str(
            r#"
            [[environment.type_aliases]]
            alias = "HttpResponseContext"
            target = "Worker.HttpResponseContext"
            "#,
        )
        .unwrap();
        assert_eq!(config.environment.type_aliases.len(), 1);
        assert_eq!(config.environment.type_aliases[0].alias, "HttpResponseContext");
    }
}
