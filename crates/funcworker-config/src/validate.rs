//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{DispatchMode, WorkerConfig};

/// Upper bound on pool size.
pub const MAX_POOL_SIZE: usize = 1024;

/// Validate a merged and deserialized configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &WorkerConfig) -> ConfigResult<()> {
    validate_pool(config)?;
    validate_dispatch(config)?;
    validate_environment(config)?;
    validate_logging(config)?;
    Ok(())
}

fn validate_pool(config: &WorkerConfig) -> ConfigResult<()> {
    if config.pool.size == 0 || config.pool.size > MAX_POOL_SIZE {
        return Err(ConfigError::ValidationError {
            field: "pool.size".to_owned(),
            message: format!(
                "pool size {} is out of range; must be between 1 and {MAX_POOL_SIZE}",
                config.pool.size
            ),
        });
    }
    Ok(())
}

fn validate_dispatch(config: &WorkerConfig) -> ConfigResult<()> {
    if config.dispatch.max_in_flight == 0 {
        return Err(ConfigError::ValidationError {
            field: "dispatch.max_in_flight".to_owned(),
            message: "must admit at least one invocation".to_owned(),
        });
    }
    config
        .dispatch
        .mode
        .parse::<DispatchMode>()
        .map(|_| ())
        .map_err(|message| ConfigError::ValidationError {
            field: "dispatch.mode".to_owned(),
            message: format!("{message}; expected one of: sequential, concurrent"),
        })
}

fn validate_environment(config: &WorkerConfig) -> ConfigResult<()> {
    let env = &config.environment;
    if env.profile_file_name.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "environment.profile_file_name".to_owned(),
            message: "profile file name must not be empty".to_owned(),
        });
    }

    for (index, entry) in env.type_aliases.iter().enumerate() {
        if entry.alias.is_empty() || entry.target.is_empty() {
            return Err(ConfigError::ValidationError {
                field: format!("environment.type_aliases[{index}]"),
                message: "alias and target must both be non-empty".to_owned(),
            });
        }
    }
    Ok(())
}

fn validate_logging(config: &WorkerConfig) -> ConfigResult<()> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.logging.level.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: format!(
                "unsupported log level '{}'; expected one of: {}",
                config.logging.level,
                valid_levels.join(", ")
            ),
        });
    }

    let valid_formats = ["pretty", "compact", "json", "full"];
    if !valid_formats.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "unsupported log format '{}'; expected one of: {}",
                config.logging.format,
                valid_formats.join(", ")
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeAliasEntry;

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&WorkerConfig::default()).is_ok());
    }

    #[test]
    fn test_pool_size_bounds() {
        let mut config = WorkerConfig::default();
        config.pool.size = MAX_POOL_SIZE;
        assert!(validate(&config).is_ok());

        config.pool.size = MAX_POOL_SIZE + 1;
        assert_eq!(field_of(validate(&config)), "pool.size");
    }

    #[test]
    fn test_unknown_dispatch_mode() {
        let mut config = WorkerConfig::default();
        config.dispatch.mode = "parallel".to_owned();
        assert_eq!(field_of(validate(&config)), "dispatch.mode");
    }

    #[test]
    fn test_zero_in_flight_limit() {
        let mut config = WorkerConfig::default();
        config.dispatch.max_in_flight = 0;
        assert_eq!(field_of(validate(&config)), "dispatch.max_in_flight");
    }

    #[test]
    fn test_empty_type_alias() {
        let mut config = WorkerConfig::default();
        config.environment.type_aliases.push(TypeAliasEntry {
            alias: String::new(),
            target: "Some.Type".to_owned(),
        });
        assert_eq!(field_of(validate(&config)), "environment.type_aliases[0]");
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = WorkerConfig::default();
        config.logging.format = "xml".to_owned();
        assert_eq!(field_of(validate(&config)), "logging.format");
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = WorkerConfig::default();
        config.logging.level = "verbose".to_owned();
        assert_eq!(field_of(validate(&config)), "logging.level");
    }
}
