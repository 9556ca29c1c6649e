//! Mock engine implementations for testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use funcworker_core::{BindingMap, FunctionMetadata, NativeValue, WorkerError, WorkerResult};
use funcworker_runtime::{EngineFactory, ExecutionEngine, UnitId, UnitSetup};

/// Function body used by [`MockEngineFactory`].
pub type MockHandler = Arc<
    dyn Fn(
            &FunctionMetadata,
            Option<&BindingMap<NativeValue>>,
            &[(String, NativeValue)],
        ) -> WorkerResult<BindingMap<NativeValue>>
        + Send
        + Sync,
>;

/// Call counters and captured arguments, shared by the factory and every
/// engine it creates.
#[derive(Default)]
pub struct MockEngineState {
    /// `prepare` calls, successful or not.
    pub prepare_calls: AtomicUsize,
    /// Engines created.
    pub engines_created: AtomicUsize,
    /// `initialize_unit` calls.
    pub unit_inits: AtomicUsize,
    /// `load_function` calls.
    pub loads: AtomicUsize,
    /// `run_function` calls.
    pub runs: AtomicUsize,
    /// `reset_unit_state` calls.
    pub resets: AtomicUsize,
    /// `dispose` calls.
    pub disposals: AtomicUsize,
    /// Highest number of overlapping `run_function` calls seen.
    pub max_concurrent_runs: AtomicUsize,
    /// Times one unit was entered while already running.
    pub exclusivity_violations: AtomicUsize,

    fail_prepare_remaining: AtomicUsize,
    fail_reset: AtomicBool,
    running: Mutex<HashSet<UnitId>>,
    fail_load: Mutex<HashSet<String>>,
    handlers: Mutex<HashMap<String, MockHandler>>,
    prepared_setup: Mutex<Option<UnitSetup>>,
    units_per_run: Mutex<Vec<UnitId>>,
    trigger_metadata: Mutex<Vec<Option<BindingMap<NativeValue>>>>,
    run_delay: Mutex<Option<Duration>>,
    runtime_version: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockEngineState {
    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Number of `prepare` calls.
    #[must_use]
    pub fn prepares(&self) -> usize {
        Self::count(&self.prepare_calls)
    }

    /// Number of engines created.
    #[must_use]
    pub fn created(&self) -> usize {
        Self::count(&self.engines_created)
    }

    /// Number of `run_function` calls.
    #[must_use]
    pub fn run_count(&self) -> usize {
        Self::count(&self.runs)
    }

    /// Number of `reset_unit_state` calls.
    #[must_use]
    pub fn reset_count(&self) -> usize {
        Self::count(&self.resets)
    }

    /// Number of `load_function` calls.
    #[must_use]
    pub fn load_count(&self) -> usize {
        Self::count(&self.loads)
    }

    /// Number of `dispose` calls.
    #[must_use]
    pub fn dispose_count(&self) -> usize {
        Self::count(&self.disposals)
    }

    /// The setup passed to the successful `prepare`.
    #[must_use]
    pub fn prepared_setup(&self) -> Option<UnitSetup> {
        lock(&self.prepared_setup).clone()
    }

    /// Units used by each run, in call order.
    #[must_use]
    pub fn units_per_run(&self) -> Vec<UnitId> {
        lock(&self.units_per_run).clone()
    }

    /// Trigger metadata passed to each run, in call order.
    #[must_use]
    pub fn trigger_metadata_seen(&self) -> Vec<Option<BindingMap<NativeValue>>> {
        lock(&self.trigger_metadata).clone()
    }
}

/// Scriptable [`EngineFactory`].
///
/// Functions without a handler return no outputs. Cloning shares state.
#[derive(Clone, Default)]
pub struct MockEngineFactory {
    state: Arc<MockEngineState>,
}

impl MockEngineFactory {
    /// Create a factory whose engines succeed at everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counters.
    #[must_use]
    pub fn state(&self) -> Arc<MockEngineState> {
        Arc::clone(&self.state)
    }

    /// Script the body of a function, keyed by function name.
    #[must_use]
    pub fn with_handler<F>(self, function_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(
                &FunctionMetadata,
                Option<&BindingMap<NativeValue>>,
                &[(String, NativeValue)],
            ) -> WorkerResult<BindingMap<NativeValue>>
            + Send
            + Sync
            + 'static,
    {
        lock(&self.state.handlers).insert(function_name.into(), Arc::new(handler));
        self
    }

    /// Script a function that returns fixed outputs.
    #[must_use]
    pub fn with_outputs(
        self,
        function_name: impl Into<String>,
        outputs: Vec<(&'static str, NativeValue)>,
    ) -> Self {
        self.with_handler(function_name, move |_, _, _| {
            Ok(outputs.iter().map(|(k, v)| (*k, v.clone())).collect())
        })
    }

    /// Script a function that raises an engine error.
    #[must_use]
    pub fn with_failure(self, function_name: impl Into<String>, message: &'static str) -> Self {
        self.with_handler(function_name, move |_, _, _| {
            Err(WorkerError::Engine {
                message: message.to_owned(),
                type_name: Some("RuntimeException".to_owned()),
                stack_trace: Some("at <script>: line 1".to_owned()),
            })
        })
    }

    /// Fail the next `times` calls to `prepare`.
    #[must_use]
    pub fn failing_prepare(self, times: usize) -> Self {
        self.state
            .fail_prepare_remaining
            .store(times, Ordering::SeqCst);
        self
    }

    /// Fail every `reset_unit_state`.
    #[must_use]
    pub fn failing_reset(self) -> Self {
        self.state.fail_reset.store(true, Ordering::SeqCst);
        self
    }

    /// Fail `load_function` for a function id.
    #[must_use]
    pub fn failing_load(self, function_id: impl Into<String>) -> Self {
        lock(&self.state.fail_load).insert(function_id.into());
        self
    }

    /// Make every run sleep, so concurrent invocations overlap.
    #[must_use]
    pub fn with_run_delay(self, delay: Duration) -> Self {
        *lock(&self.state.run_delay) = Some(delay);
        self
    }

    /// Report `version` as the runtime version.
    #[must_use]
    pub fn with_runtime_version(self, version: impl Into<String>) -> Self {
        *lock(&self.state.runtime_version) = Some(version.into());
        self
    }

    /// Stop failing resets.
    pub fn heal_reset(&self) {
        self.state.fail_reset.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl EngineFactory for MockEngineFactory {
    async fn prepare(&self, setup: &UnitSetup) -> WorkerResult<()> {
        self.state.prepare_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.state.fail_prepare_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state
                .fail_prepare_remaining
                .store(remaining.saturating_sub(1), Ordering::SeqCst);
            return Err(WorkerError::engine("engine setup failed"));
        }
        *lock(&self.state.prepared_setup) = Some(setup.clone());
        Ok(())
    }

    async fn create_engine(&self, unit_id: &UnitId) -> WorkerResult<Box<dyn ExecutionEngine>> {
        self.state.engines_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockEngine {
            unit_id: *unit_id,
            state: Arc::clone(&self.state),
        }))
    }

    fn runtime_version(&self) -> Option<String> {
        lock(&self.state.runtime_version).clone()
    }
}

/// Engine created by [`MockEngineFactory`].
pub struct MockEngine {
    unit_id: UnitId,
    state: Arc<MockEngineState>,
}

impl MockEngine {
    fn enter(&self) {
        let mut running = lock(&self.state.running);
        if !running.insert(self.unit_id) {
            self.state
                .exclusivity_violations
                .fetch_add(1, Ordering::SeqCst);
        }
        self.state
            .max_concurrent_runs
            .fetch_max(running.len(), Ordering::SeqCst);
    }

    fn leave(&self) {
        lock(&self.state.running).remove(&self.unit_id);
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    async fn initialize_unit(&mut self, _setup: &UnitSetup) -> WorkerResult<()> {
        self.state.unit_inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_function(&mut self, metadata: &FunctionMetadata) -> WorkerResult<()> {
        self.state.loads.fetch_add(1, Ordering::SeqCst);
        if lock(&self.state.fail_load).contains(&metadata.function_id) {
            return Err(WorkerError::engine(format!(
                "cannot compile {}",
                metadata.script_file.display()
            )));
        }
        Ok(())
    }

    async fn run_function(
        &mut self,
        metadata: &FunctionMetadata,
        trigger_metadata: Option<&BindingMap<NativeValue>>,
        inputs: &[(String, NativeValue)],
    ) -> WorkerResult<BindingMap<NativeValue>> {
        self.state.runs.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.units_per_run).push(self.unit_id);
        lock(&self.state.trigger_metadata).push(trigger_metadata.cloned());

        self.enter();
        let delay = *lock(&self.state.run_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let handler = lock(&self.state.handlers).get(&metadata.name).cloned();
        let result = match handler {
            Some(handler) => handler(metadata, trigger_metadata, inputs),
            None => Ok(BindingMap::new()),
        };
        self.leave();
        result
    }

    async fn reset_unit_state(&mut self) -> WorkerResult<()> {
        self.state.resets.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_reset.load(Ordering::SeqCst) {
            return Err(WorkerError::engine("background jobs could not be stopped"));
        }
        Ok(())
    }

    async fn dispose(&mut self) {
        self.state.disposals.fetch_add(1, Ordering::SeqCst);
    }
}
