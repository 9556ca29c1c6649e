//! Bridge from [`funcworker_config::WorkerConfig`] to runtime types.
//!
//! The config crate has no dependencies on other funcworker crates, so
//! config-to-domain conversion happens here, once.

use std::sync::Arc;
use std::time::Duration;

use funcworker_config::WorkerConfig;
use funcworker_telemetry::{LogConfig, TelemetryResult};

use crate::dispatcher::{Dispatcher, DispatcherSettings};
use crate::environment::TypeAlias;
use crate::pool::{PoolConfig, UnitPool};
use crate::registry::FunctionRegistry;
use crate::unit::EngineFactory;

/// Convert the `[pool]` section.
#[must_use]
pub fn to_pool_config(cfg: &WorkerConfig) -> PoolConfig {
    PoolConfig {
        size: cfg.pool.size,
        checkout_timeout: (cfg.pool.checkout_timeout_ms > 0)
            .then(|| Duration::from_millis(cfg.pool.checkout_timeout_ms)),
    }
}

/// Convert the `[dispatch]` and `[environment]` sections.
///
/// An unknown dispatch mode falls back to sequential; [`WorkerConfig::load`]
/// rejects one before it gets here.
#[must_use]
pub fn to_dispatcher_settings(cfg: &WorkerConfig) -> DispatcherSettings {
    DispatcherSettings {
        mode: cfg.dispatch.parsed_mode().unwrap_or_default(),
        max_in_flight: cfg.dispatch.max_in_flight,
        capabilities: cfg.environment.capabilities.clone(),
        profile_file_name: cfg.environment.profile_file_name.clone(),
        type_aliases: cfg
            .environment
            .type_aliases
            .iter()
            .map(|entry| TypeAlias {
                alias: entry.alias.clone(),
                target: entry.target.clone(),
            })
            .collect(),
        ..DispatcherSettings::default()
    }
}

/// Convert the `[logging]` section.
///
/// # Errors
///
/// Returns an error if the log format is unknown.
pub fn to_log_config(cfg: &WorkerConfig) -> TelemetryResult<LogConfig> {
    LogConfig::from_section(&cfg.logging)
}

/// Build a dispatcher with a fresh registry and pool.
#[must_use]
pub fn build_dispatcher(cfg: &WorkerConfig, factory: Arc<dyn EngineFactory>) -> Dispatcher {
    let registry = Arc::new(FunctionRegistry::new());
    let pool = UnitPool::new(factory, Arc::clone(&registry), to_pool_config(cfg));
    Dispatcher::new(registry, pool, to_dispatcher_settings(cfg))
}
