//! Function registry.
//!
//! Holds the metadata of every loaded function for the lifetime of the
//! process. Written only while handling function loads, read by every
//! invocation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use funcworker_core::{FunctionMetadata, WorkerError, WorkerResult};
use tracing::info;

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<String, Arc<FunctionMetadata>>,
    order: Vec<Arc<FunctionMetadata>>,
}

/// Registry of loaded functions keyed by function id.
#[derive(Default)]
pub struct FunctionRegistry {
    inner: RwLock<RegistryInner>,
}

impl FunctionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::DuplicateFunction`] if the id is already
    /// registered. The existing entry is kept.
    pub fn register(&self, metadata: FunctionMetadata) -> WorkerResult<Arc<FunctionMetadata>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.by_id.contains_key(&metadata.function_id) {
            return Err(WorkerError::DuplicateFunction {
                function_id: metadata.function_id,
            });
        }

        let metadata = Arc::new(metadata);
        info!(
            function_id = %metadata.function_id,
            name = %metadata.name,
            kind = %metadata.kind,
            "Registered function"
        );
        inner
            .by_id
            .insert(metadata.function_id.clone(), Arc::clone(&metadata));
        inner.order.push(Arc::clone(&metadata));
        Ok(metadata)
    }

    /// Look up a function by id.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::UnknownFunction`] if the id is not registered.
    pub fn lookup(&self, function_id: &str) -> WorkerResult<Arc<FunctionMetadata>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(function_id)
            .cloned()
            .ok_or_else(|| WorkerError::UnknownFunction {
                function_id: function_id.to_owned(),
            })
    }

    /// Every registered function, in registration order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<FunctionMetadata>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .clone()
    }

    /// Number of registered functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    /// Whether no function is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funcworker_core::{BindingMap, FunctionKind};
    use std::path::PathBuf;

    fn metadata(id: &str, name: &str) -> FunctionMetadata {
        FunctionMetadata {
            function_id: id.into(),
            name: name.into(),
            kind: FunctionKind::Regular,
            directory: PathBuf::from("/app").join(name),
            script_file: PathBuf::from("/app").join(name).join("run.script"),
            entry_point: None,
            input_bindings: BindingMap::new(),
            output_bindings: BindingMap::new(),
            uses_trigger_metadata: false,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = FunctionRegistry::new();
        registry.register(metadata("f1", "First")).unwrap();

        assert_eq!(registry.lookup("f1").unwrap().name, "First");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = FunctionRegistry::new();
        let err = registry.lookup("missing").unwrap_err();
        assert!(matches!(err, WorkerError::UnknownFunction { ref function_id } if function_id == "missing"));
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let registry = FunctionRegistry::new();
        registry.register(metadata("f1", "First")).unwrap();
        let err = registry.register(metadata("f1", "Second")).unwrap_err();

        assert!(matches!(err, WorkerError::DuplicateFunction { .. }));
        assert_eq!(registry.lookup("f1").unwrap().name, "First");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_all_in_registration_order() {
        let registry = FunctionRegistry::new();
        for (id, name) in [("c", "C"), ("a", "A"), ("b", "B")] {
            registry.register(metadata(id, name)).unwrap();
        }
        let ids: Vec<_> = registry
            .all()
            .iter()
            .map(|m| m.function_id.clone())
            .collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }
}
