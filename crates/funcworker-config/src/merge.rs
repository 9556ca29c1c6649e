//! Layered TOML document.
//!
//! Layers are merged as raw TOML before deserialization, so a key the file
//! leaves out keeps its default. Each leaf remembers the layer that last
//! wrote it; env fallbacks consult that to skip fields the file set.

use std::collections::HashMap;
use std::fmt;

use toml::Value;
use toml::map::Map;

/// Where a config value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Embedded `defaults.toml`.
    Defaults,
    /// The file passed to [`crate::WorkerConfig::load`].
    File,
    /// A `FUNCWORKER_*` variable.
    Environment,
}

impl fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Defaults => "defaults",
            Self::File => "config file",
            Self::Environment => "environment variable",
        })
    }
}

/// A TOML tree plus the origin of every leaf, keyed by dotted path.
#[derive(Debug, Clone)]
pub struct LayeredToml {
    root: Value,
    origins: HashMap<String, ConfigLayer>,
}

impl LayeredToml {
    /// Start from `base`, attributing all of it to `layer`.
    #[must_use]
    pub fn new(base: Value, layer: ConfigLayer) -> Self {
        let mut doc = Self {
            root: Value::Table(Map::new()),
            origins: HashMap::new(),
        };
        doc.overlay(&base, layer);
        doc
    }

    /// Merge `overlay` on top. Tables merge key by key; any other value
    /// replaces what was there.
    pub fn overlay(&mut self, overlay: &Value, layer: ConfigLayer) {
        merge_into(&mut self.root, overlay, "", layer, &mut self.origins);
    }

    /// Set one leaf, creating missing parent tables.
    ///
    /// Returns `false` when a parent on the path is not a table.
    pub fn set(&mut self, path: &str, value: Value, layer: ConfigLayer) -> bool {
        let mut current = &mut self.root;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Some(table) = current.as_table_mut() else {
                return false;
            };
            if segments.peek().is_none() {
                table.insert(segment.to_owned(), value);
                self.origins.insert(path.to_owned(), layer);
                return true;
            }
            current = table
                .entry(segment.to_owned())
                .or_insert_with(|| Value::Table(Map::new()));
        }
        false
    }

    /// Layer that last wrote the leaf at `path`.
    #[must_use]
    pub fn origin(&self, path: &str) -> Option<ConfigLayer> {
        self.origins.get(path).copied()
    }

    /// The merged tree.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.root
    }
}

fn merge_into(
    target: &mut Value,
    overlay: &Value,
    path: &str,
    layer: ConfigLayer,
    origins: &mut HashMap<String, ConfigLayer>,
) {
    let Value::Table(overlay_table) = overlay else {
        if target.is_table() {
            // The replaced table's leaves no longer exist.
            let nested = format!("{path}.");
            origins.retain(|p, _| !p.starts_with(&nested));
        }
        *target = overlay.clone();
        origins.insert(path.to_owned(), layer);
        return;
    };
    if !target.is_table() {
        origins.remove(path);
        *target = Value::Table(Map::new());
    }
    let Value::Table(target_table) = target else {
        return;
    };
    for (key, value) in overlay_table {
        let child_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}.{key}")
        };
        let child = target_table
            .entry(key.clone())
            .or_insert_with(|| Value::Table(Map::new()));
        merge_into(child, value, &child_path, layer, origins);
    }
}
