//! Execution units and the engine interface they wrap.
//!
//! An [`ExecutionEngine`] is the scripting engine's side of a unit: opaque
//! to the worker and reached only through this trait. An [`ExecutionUnit`]
//! owns one engine exclusively and adds the bookkeeping the pool needs:
//! whether per-unit setup ran and which functions are loaded.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use funcworker_core::{
    BindingMap, DataType, FunctionKind, FunctionMetadata, InvocationRequest, NativeValue,
    ParameterBinding, TypedData, WorkerError, WorkerResult, is_return_binding,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bindings;
use crate::environment::UnitSetup;

/// Unique identifier for an execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(Uuid);

impl UnitId {
    /// Create a new random unit id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UnitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A scripting engine instance backing one execution unit.
///
/// Calls on one engine never overlap: a unit is used by one invocation at
/// a time.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Per-unit setup, run once before any function is loaded.
    async fn initialize_unit(&mut self, setup: &UnitSetup) -> WorkerResult<()>;

    /// Make a function callable in this engine.
    async fn load_function(&mut self, metadata: &FunctionMetadata) -> WorkerResult<()>;

    /// Run a function.
    ///
    /// `trigger_metadata` is only passed to functions that opt in. The
    /// returned map is keyed by output binding name; `$return` carries the
    /// return value.
    async fn run_function(
        &mut self,
        metadata: &FunctionMetadata,
        trigger_metadata: Option<&BindingMap<NativeValue>>,
        inputs: &[(String, NativeValue)],
    ) -> WorkerResult<BindingMap<NativeValue>>;

    /// Discard state left by the last invocation, including background work
    /// it started.
    async fn reset_unit_state(&mut self) -> WorkerResult<()>;

    /// Release engine resources. Called once before the unit is dropped.
    async fn dispose(&mut self) {}
}

/// Creates engines and performs process-wide engine setup.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// One-time process-wide setup, including capability registrations
    /// such as type aliases. Called at most once successfully.
    async fn prepare(&self, setup: &UnitSetup) -> WorkerResult<()>;

    /// Create the engine for a new unit.
    async fn create_engine(&self, unit_id: &UnitId) -> WorkerResult<Box<dyn ExecutionEngine>>;

    /// Version of the language runtime behind the engines, if known.
    fn runtime_version(&self) -> Option<String> {
        None
    }
}

/// Converted result of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationOutcome {
    /// Declared outputs, in declaration order.
    pub output_data: Vec<ParameterBinding>,
    /// Value of the `$return` binding, if declared and produced.
    pub return_value: Option<TypedData>,
}

/// A reusable, stateful runner of one function at a time.
pub struct ExecutionUnit {
    id: UnitId,
    engine: Box<dyn ExecutionEngine>,
    initialized: bool,
    loaded: HashSet<String>,
}

impl ExecutionUnit {
    /// Wrap a freshly created engine.
    #[must_use]
    pub fn new(id: UnitId, engine: Box<dyn ExecutionEngine>) -> Self {
        Self {
            id,
            engine,
            initialized: false,
            loaded: HashSet::new(),
        }
    }

    /// Unit id.
    #[must_use]
    pub fn id(&self) -> UnitId {
        self.id
    }

    /// Whether per-unit setup ran.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether a function is loaded into this unit.
    #[must_use]
    pub fn is_loaded(&self, function_id: &str) -> bool {
        self.loaded.contains(function_id)
    }

    /// Run per-unit setup once, then load every function registered so far.
    ///
    /// # Errors
    ///
    /// Returns the engine's setup error, or a [`WorkerError::LoadError`] for
    /// the first function that fails to load.
    pub async fn initialize(
        &mut self,
        setup: &UnitSetup,
        functions: &[Arc<FunctionMetadata>],
    ) -> WorkerResult<()> {
        if !self.initialized {
            self.engine.initialize_unit(setup).await?;
            self.initialized = true;
            debug!(unit_id = %self.id, "Execution unit initialized");
        }
        for metadata in functions {
            self.ensure_loaded(metadata).await?;
        }
        Ok(())
    }

    /// Load a function if this unit has not loaded it yet.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::LoadError`] if the engine fails to load it.
    pub async fn ensure_loaded(&mut self, metadata: &FunctionMetadata) -> WorkerResult<()> {
        if self.loaded.contains(&metadata.function_id) {
            return Ok(());
        }
        self.engine
            .load_function(metadata)
            .await
            .map_err(|e| match e {
                WorkerError::LoadError { .. } => e,
                other => WorkerError::load(&metadata.function_id, other),
            })?;
        self.loaded.insert(metadata.function_id.clone());
        debug!(
            unit_id = %self.id,
            function_id = %metadata.function_id,
            "Function loaded into unit"
        );
        Ok(())
    }

    /// Run one invocation and convert its outputs.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::NotImplemented`] for orchestration and activity
    ///   functions; the engine is not called.
    /// - [`WorkerError::UnsupportedBindingType`] if an input or output
    ///   cannot be converted.
    /// - Whatever the engine raised.
    pub async fn invoke(
        &mut self,
        metadata: &FunctionMetadata,
        request: &InvocationRequest,
    ) -> WorkerResult<InvocationOutcome> {
        match metadata.kind {
            FunctionKind::Regular => {},
            FunctionKind::Orchestration | FunctionKind::Activity => {
                return Err(WorkerError::NotImplemented(format!(
                    "{} functions are not supported",
                    metadata.kind
                )));
            },
        }

        let inputs = convert_inputs(metadata, &request.input_data)?;
        let trigger_metadata = if metadata.uses_trigger_metadata {
            Some(bindings::trigger_metadata(&request.trigger_metadata)?)
        } else {
            None
        };

        let outputs = self
            .engine
            .run_function(metadata, trigger_metadata.as_ref(), &inputs)
            .await?;

        convert_outputs(metadata, outputs)
    }

    /// Discard per-invocation state.
    ///
    /// # Errors
    ///
    /// Returns the engine's error; the unit must not be reused after one.
    pub async fn reset(&mut self) -> WorkerResult<()> {
        self.engine.reset_unit_state().await
    }

    /// Release the engine.
    pub async fn dispose(mut self) {
        self.engine.dispose().await;
        debug!(unit_id = %self.id, "Execution unit disposed");
    }
}

impl fmt::Debug for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionUnit")
            .field("id", &self.id)
            .field("initialized", &self.initialized)
            .field("loaded", &self.loaded.len())
            .finish_non_exhaustive()
    }
}

fn convert_inputs(
    metadata: &FunctionMetadata,
    input_data: &[ParameterBinding],
) -> WorkerResult<Vec<(String, NativeValue)>> {
    let mut inputs = BindingMap::new();
    for binding in input_data {
        if inputs.contains_key(&binding.name) {
            continue;
        }
        let data_type = match metadata.input_bindings.get(&binding.name) {
            Some(info) => info.data_type,
            None => {
                debug!(binding = %binding.name, "input binding is not declared");
                DataType::Undefined
            },
        };
        let value = bindings::to_native(&binding.data, data_type)
            .map_err(|e| annotate(e, "input", &binding.name))?;
        inputs.insert(binding.name.as_str(), value);
    }
    Ok(inputs.into_iter().collect())
}

fn convert_outputs(
    metadata: &FunctionMetadata,
    mut outputs: BindingMap<NativeValue>,
) -> WorkerResult<InvocationOutcome> {
    let mut outcome = InvocationOutcome::default();

    for (name, info) in metadata.output_bindings.iter() {
        let Some((_, value)) = outputs.remove(name) else {
            continue;
        };
        let value = if info.is_http() {
            NativeValue::HttpResponse(bindings::to_http_response(value))
        } else {
            value
        };
        let data = bindings::to_wire(&value).map_err(|e| annotate(e, "output", name))?;

        if is_return_binding(name) {
            outcome.return_value = Some(data);
        } else {
            outcome.output_data.push(ParameterBinding::new(name, data));
        }
    }

    for name in outputs.keys() {
        warn!(
            function_id = %metadata.function_id,
            binding = name,
            "dropping value for undeclared output binding"
        );
    }

    Ok(outcome)
}

fn annotate(err: WorkerError, direction: &str, name: &str) -> WorkerError {
    match err {
        WorkerError::UnsupportedBindingType(message) => WorkerError::UnsupportedBindingType(
            format!("{direction} binding '{name}': {message}"),
        ),
        other => other,
    }
}
