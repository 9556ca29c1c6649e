//! Execution unit pool.
//!
//! Capacity is a semaphore: a checkout holds one permit until its unit is
//! reclaimed. Idle units sit on a stack behind a mutex held only for push
//! and pop. Units move by value into a [`UnitLease`], so two callers can
//! never hold the same unit.
//!
//! Reset is async and cannot run in `Drop`. Callers hand the lease back with
//! [`UnitPool::reclaim`]; a lease dropped without reclaim (panic, aborted
//! task) discards its unit rather than returning it dirty.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use funcworker_core::{FunctionMetadata, InvocationRequest, WorkerError, WorkerResult};
use tokio::sync::{OnceCell, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::environment::UnitSetup;
use crate::registry::FunctionRegistry;
use crate::unit::{EngineFactory, ExecutionUnit, InvocationOutcome, UnitId};

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of units.
    pub size: usize,
    /// Bound on how long a checkout waits. `None` waits forever.
    pub checkout_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 1,
            checkout_timeout: None,
        }
    }
}

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum number of units.
    pub capacity: usize,
    /// Units created over the pool's lifetime.
    pub created: usize,
    /// Units waiting for a checkout.
    pub idle: usize,
    /// Units currently leased.
    pub checked_out: usize,
    /// Units thrown away after a failed reset or an unreclaimed lease.
    pub discarded: usize,
}

struct PoolInner {
    factory: Arc<dyn EngineFactory>,
    registry: Arc<FunctionRegistry>,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    idle: Mutex<Vec<ExecutionUnit>>,
    setup: OnceCell<Arc<UnitSetup>>,
    created: AtomicUsize,
    checked_out: AtomicUsize,
    discarded: AtomicUsize,
}

impl PoolInner {
    fn push_idle(&self, unit: ExecutionUnit) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(unit);
    }

    fn pop_idle(&self) -> Option<ExecutionUnit> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop()
    }
}

/// Bounded pool of execution units with exclusive checkout.
///
/// Cloning is cheap; clones share the same units.
#[derive(Clone)]
pub struct UnitPool {
    inner: Arc<PoolInner>,
}

impl UnitPool {
    /// Create a pool. No unit exists until the first checkout.
    #[must_use]
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        registry: Arc<FunctionRegistry>,
        config: PoolConfig,
    ) -> Self {
        let size = config.size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                factory,
                registry,
                config: PoolConfig { size, ..config },
                semaphore: Arc::new(Semaphore::new(size)),
                idle: Mutex::new(Vec::with_capacity(size)),
                setup: OnceCell::new(),
                created: AtomicUsize::new(0),
                checked_out: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
            }),
        }
    }

    /// Run the factory's one-time setup.
    ///
    /// Idempotent: after the first success later calls return immediately
    /// and ignore `setup`. A failed setup leaves the pool uninitialized so
    /// the next call retries.
    ///
    /// # Errors
    ///
    /// Returns the factory's error.
    pub async fn initialize(&self, setup: UnitSetup) -> WorkerResult<()> {
        let factory = Arc::clone(&self.inner.factory);
        self.inner
            .setup
            .get_or_try_init(|| async move {
                factory.prepare(&setup).await?;
                info!(
                    root = %setup.environment.function_app_root.display(),
                    type_aliases = setup.type_aliases.len(),
                    "Execution unit pool initialized"
                );
                Ok::<_, WorkerError>(Arc::new(setup))
            })
            .await
            .map(|_| ())
    }

    /// Whether one-time setup has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.setup.initialized()
    }

    /// Runtime version reported by the engine factory.
    #[must_use]
    pub fn runtime_version(&self) -> Option<String> {
        self.inner.factory.runtime_version()
    }

    /// Check out a unit with `metadata` loaded.
    ///
    /// Reuses an idle unit or creates one while capacity remains. At
    /// capacity, waits for a reclaim, bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::PoolExhaustedTimeout`] if the wait times out.
    /// - [`WorkerError::LoadError`] if the pool is not initialized or the
    ///   function cannot be loaded.
    /// - The engine's error if a new unit fails to initialize.
    pub async fn checkout(&self, metadata: &FunctionMetadata) -> WorkerResult<UnitLease> {
        let setup = self.inner.setup.get().cloned().ok_or_else(|| {
            WorkerError::load(
                &metadata.function_id,
                "execution unit pool is not initialized",
            )
        })?;

        let permit = self.acquire_permit().await?;

        let mut unit = match self.inner.pop_idle() {
            Some(unit) => unit,
            None => self.create_unit(&setup).await?,
        };

        if let Err(e) = unit.ensure_loaded(metadata).await {
            self.inner.push_idle(unit);
            return Err(e);
        }

        self.inner.checked_out.fetch_add(1, Ordering::SeqCst);
        debug!(
            unit_id = %unit.id(),
            function_id = %metadata.function_id,
            "Execution unit checked out"
        );
        Ok(UnitLease {
            unit: Some(unit),
            permit: Some(permit),
            pool: Arc::clone(&self.inner),
        })
    }

    async fn acquire_permit(&self) -> WorkerResult<OwnedSemaphorePermit> {
        let semaphore = Arc::clone(&self.inner.semaphore);
        let acquired = match self.inner.config.checkout_timeout {
            Some(limit) => {
                let started = Instant::now();
                tokio::time::timeout(limit, semaphore.acquire_owned())
                    .await
                    .map_err(|_| WorkerError::PoolExhaustedTimeout {
                        waited_ms: u64::try_from(started.elapsed().as_millis())
                            .unwrap_or(u64::MAX),
                    })?
            },
            None => semaphore.acquire_owned().await,
        };
        acquired.map_err(|_| WorkerError::engine("execution unit pool is closed"))
    }

    async fn create_unit(&self, setup: &UnitSetup) -> WorkerResult<ExecutionUnit> {
        let id = UnitId::new();
        let engine = self.inner.factory.create_engine(&id).await?;
        let mut unit = ExecutionUnit::new(id, engine);

        let functions = self.inner.registry.all();
        if let Err(e) = unit.initialize(setup, &functions).await {
            warn!(unit_id = %id, error = %e, "New execution unit failed to initialize");
            unit.dispose().await;
            return Err(e);
        }

        let created = self
            .inner
            .created
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1);
        info!(
            unit_id = %id,
            created,
            capacity = self.inner.config.size,
            replayed = functions.len(),
            "Created execution unit"
        );
        Ok(unit)
    }

    /// Return a leased unit to the pool.
    ///
    /// `None` is a no-op, covering a checkout that failed. Otherwise the
    /// unit is reset and goes back to idle; if the reset fails the unit is
    /// disposed and its slot freed for a fresh one. The permit is released
    /// last.
    pub async fn reclaim(&self, lease: Option<UnitLease>) {
        let Some(mut lease) = lease else {
            return;
        };
        let Some(mut unit) = lease.unit.take() else {
            return;
        };
        let permit = lease.permit.take();

        match unit.reset().await {
            Ok(()) => {
                debug!(unit_id = %unit.id(), "Execution unit reclaimed");
                self.inner.push_idle(unit);
            },
            Err(e) => {
                warn!(
                    unit_id = %unit.id(),
                    error = %e,
                    "Execution unit reset failed, discarding unit"
                );
                unit.dispose().await;
                self.inner.discarded.fetch_add(1, Ordering::SeqCst);
            },
        }

        self.inner.checked_out.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
    }

    /// Dispose the leased unit instead of returning it to the idle stack,
    /// freeing its slot. Used when the unit's state can no longer be trusted.
    pub async fn discard(&self, mut lease: UnitLease) {
        let Some(unit) = lease.unit.take() else {
            return;
        };
        let permit = lease.permit.take();
        warn!(unit_id = %unit.id(), "Discarding execution unit");
        unit.dispose().await;
        self.inner.discarded.fetch_add(1, Ordering::SeqCst);
        self.inner.checked_out.fetch_sub(1, Ordering::SeqCst);
        drop(permit);
    }

    /// Dispose every idle unit and refuse further checkouts.
    pub async fn close(&self) {
        self.inner.semaphore.close();
        let units = std::mem::take(
            &mut *self
                .inner
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let count = units.len();
        for unit in units {
            unit.dispose().await;
        }
        info!(disposed = count, "Execution unit pool closed");
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.inner.config.size,
            created: self.inner.created.load(Ordering::SeqCst),
            idle: self
                .inner
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            checked_out: self.inner.checked_out.load(Ordering::SeqCst),
            discarded: self.inner.discarded.load(Ordering::SeqCst),
        }
    }
}

impl std::fmt::Debug for UnitPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitPool")
            .field("stats", &self.stats())
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

/// Exclusive hold on one execution unit and one unit of pool capacity.
///
/// Hand it back with [`UnitPool::reclaim`]. Dropping it instead discards
/// the unit and frees the slot.
pub struct UnitLease {
    unit: Option<ExecutionUnit>,
    permit: Option<OwnedSemaphorePermit>,
    pool: Arc<PoolInner>,
}

impl UnitLease {
    /// Id of the leased unit.
    #[must_use]
    pub fn unit_id(&self) -> Option<UnitId> {
        self.unit.as_ref().map(ExecutionUnit::id)
    }

    /// The leased unit.
    #[must_use]
    pub fn unit(&self) -> Option<&ExecutionUnit> {
        self.unit.as_ref()
    }

    /// Run an invocation on the leased unit.
    ///
    /// # Errors
    ///
    /// See [`ExecutionUnit::invoke`].
    pub async fn invoke(
        &mut self,
        metadata: &FunctionMetadata,
        request: &InvocationRequest,
    ) -> WorkerResult<InvocationOutcome> {
        match self.unit.as_mut() {
            Some(unit) => unit.invoke(metadata, request).await,
            None => Err(WorkerError::engine("unit lease is empty")),
        }
    }
}

impl Drop for UnitLease {
    fn drop(&mut self) {
        if let Some(unit) = self.unit.take() {
            warn!(unit_id = %unit.id(), "Unit lease dropped without reclaim, discarding unit");
            self.pool.discarded.fetch_add(1, Ordering::SeqCst);
            self.pool.checked_out.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl std::fmt::Debug for UnitLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitLease")
            .field("unit_id", &self.unit_id())
            .finish_non_exhaustive()
    }
}
