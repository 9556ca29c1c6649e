//! Config loading: embedded defaults, then the optional file, then
//! `FUNCWORKER_*` fallbacks for fields the file left unset. The merged tree
//! is deserialized and validated last.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::env;
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, LayeredToml};
use crate::types::WorkerConfig;
use crate::validate;

const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Larger files are rejected unread.
const MAX_CONFIG_BYTES: u64 = 1024 * 1024;

/// Load using the process environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or if the
/// merged configuration fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<WorkerConfig> {
    load_with_env(path, &env::process_env())
}

/// Load with an explicit environment snapshot.
///
/// # Errors
///
/// As [`load`].
pub fn load_with_env<S: BuildHasher>(
    path: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<WorkerConfig> {
    let defaults = parse(DEFAULTS_TOML, "<embedded defaults>")?;
    let mut doc = LayeredToml::new(defaults, ConfigLayer::Defaults);

    if let Some(path) = path {
        doc.overlay(&read_file(path)?, ConfigLayer::File);
        info!(path = %path.display(), "Loaded worker config");
    }

    let applied = env::apply_fallbacks(&mut doc, env_vars);
    if applied > 0 {
        debug!(applied, "Applied environment fallbacks");
    }

    let config = WorkerConfig::deserialize(doc.into_value()).map_err(|source| {
        ConfigError::ParseError {
            path: "<merged config>".to_owned(),
            source,
        }
    })?;
    validate::validate(&config)?;
    Ok(config)
}

fn parse(content: &str, origin: &str) -> ConfigResult<toml::Value> {
    toml::from_str(content).map_err(|source| ConfigError::ParseError {
        path: origin.to_owned(),
        source,
    })
}

fn read_file(path: &Path) -> ConfigResult<toml::Value> {
    let shown = path.display().to_string();
    let read_error = |source| ConfigError::ReadError {
        path: shown.clone(),
        source,
    };

    let size = std::fs::metadata(path).map_err(read_error)?.len();
    if size > MAX_CONFIG_BYTES {
        return Err(ConfigError::ValidationError {
            field: shown.clone(),
            message: format!("config file is {size} bytes; the limit is {MAX_CONFIG_BYTES}"),
        });
    }

    let content = std::fs::read_to_string(path).map_err(read_error)?;
    parse(&content, &shown)
}
