//! `FUNCWORKER_*` environment fallbacks.
//!
//! A variable only fills a field the config file left unset; it never
//! overrides the file.

use std::collections::HashMap;
use std::hash::BuildHasher;

use toml::Value;
use tracing::{debug, warn};

use crate::merge::{ConfigLayer, LayeredToml};

#[derive(Debug, Clone, Copy)]
enum Kind {
    Integer,
    Text,
}

/// Variable name, config path and value kind.
const FALLBACKS: &[(&str, &str, Kind)] = &[
    ("FUNCWORKER_POOL_SIZE", "pool.size", Kind::Integer),
    (
        "FUNCWORKER_CHECKOUT_TIMEOUT_MS",
        "pool.checkout_timeout_ms",
        Kind::Integer,
    ),
    ("FUNCWORKER_DISPATCH_MODE", "dispatch.mode", Kind::Text),
    (
        "FUNCWORKER_MAX_IN_FLIGHT",
        "dispatch.max_in_flight",
        Kind::Integer,
    ),
    ("FUNCWORKER_LOG_LEVEL", "logging.level", Kind::Text),
    ("FUNCWORKER_LOG_FORMAT", "logging.format", Kind::Text),
];

/// Snapshot the process environment.
#[must_use]
pub fn process_env() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Fill unset fields of `doc` from `env`. Returns how many were applied.
pub fn apply_fallbacks<S: BuildHasher>(
    doc: &mut LayeredToml,
    env: &HashMap<String, String, S>,
) -> usize {
    let mut applied: usize = 0;
    for &(var, path, kind) in FALLBACKS {
        if doc.origin(path) == Some(ConfigLayer::File) {
            continue;
        }
        let Some(raw) = env.get(var) else {
            continue;
        };
        if doc.set(path, to_value(kind, raw), ConfigLayer::Environment) {
            debug!(var, field = path, "Applied environment fallback");
            applied = applied.saturating_add(1);
        } else {
            warn!(var, field = path, "Environment fallback has no place to go");
        }
    }
    applied
}

/// A number that fails to parse stays a string, so deserialization later
/// reports a type error naming the field.
fn to_value(kind: Kind, raw: &str) -> Value {
    match kind {
        Kind::Integer => raw
            .trim()
            .parse()
            .map_or_else(|_| Value::String(raw.to_owned()), Value::Integer),
        Kind::Text => Value::String(raw.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn defaults(s: &str) -> LayeredToml {
        LayeredToml::new(toml::from_str(s).unwrap(), ConfigLayer::Defaults)
    }

    #[test]
    fn test_fallback_fills_default_field() {
        let mut doc = defaults("[pool]\nsize = 1\n");
        let applied = apply_fallbacks(&mut doc, &env(&[("FUNCWORKER_POOL_SIZE", "8")]));

        assert_eq!(applied, 1);
        assert_eq!(doc.origin("pool.size"), Some(ConfigLayer::Environment));
        assert_eq!(doc.into_value()["pool"]["size"].as_integer(), Some(8));
    }

    #[test]
    fn test_fallback_never_beats_file() {
        let mut doc = defaults("[pool]\nsize = 1\n");
        doc.overlay(&toml::from_str("[pool]\nsize = 2\n").unwrap(), ConfigLayer::File);
        let applied = apply_fallbacks(&mut doc, &env(&[("FUNCWORKER_POOL_SIZE", "8")]));

        assert_eq!(applied, 0);
        assert_eq!(doc.into_value()["pool"]["size"].as_integer(), Some(2));
    }

    #[test]
    fn test_fallback_creates_section() {
        let mut doc = defaults("");
        apply_fallbacks(
            &mut doc,
            &env(&[
                ("FUNCWORKER_DISPATCH_MODE", "concurrent"),
                ("FUNCWORKER_LOG_FORMAT", "json"),
            ]),
        );

        let root = doc.into_value();
        assert_eq!(root["dispatch"]["mode"].as_str(), Some("concurrent"));
        assert_eq!(root["logging"]["format"].as_str(), Some("json"));
    }

    #[test]
    fn test_unrelated_vars_ignored() {
        let mut doc = defaults("[pool]\nsize = 1\n");
        assert_eq!(apply_fallbacks(&mut doc, &env(&[("HOME", "/root")])), 0);
    }

    #[test]
    fn test_bad_number_stays_text() {
        assert_eq!(to_value(Kind::Integer, " 12 "), Value::Integer(12));
        assert_eq!(
            to_value(Kind::Integer, "lots"),
            Value::String("lots".to_owned())
        );
    }
}
