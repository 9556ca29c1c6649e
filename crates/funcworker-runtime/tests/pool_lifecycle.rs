//! Execution unit pool lifecycle tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use funcworker_core::{FunctionMetadata, WorkerError};
use funcworker_runtime::{FunctionRegistry, PoolConfig, UnitPool};
use funcworker_test::{
    MockEngineFactory, test_function_metadata, test_queue_bindings, test_unit_setup,
};

fn pool_with(
    factory: &MockEngineFactory,
    size: usize,
    checkout_timeout: Option<Duration>,
) -> (UnitPool, Arc<FunctionMetadata>) {
    let registry = Arc::new(FunctionRegistry::new());
    let metadata = registry
        .register(test_function_metadata("f1", "Queue", test_queue_bindings()))
        .unwrap();
    let pool = UnitPool::new(
        Arc::new(factory.clone()),
        registry,
        PoolConfig {
            size,
            checkout_timeout,
        },
    );
    (pool, metadata)
}

#[tokio::test]
async fn test_checkout_requires_initialization() {
    let factory = MockEngineFactory::new();
    let (pool, metadata) = pool_with(&factory, 1, None);

    let err = pool.checkout(&metadata).await.unwrap_err();

    assert!(matches!(err, WorkerError::LoadError { .. }));
    assert_eq!(factory.state().created(), 0);
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let factory = MockEngineFactory::new();
    let (pool, _) = pool_with(&factory, 1, None);

    for _ in 0..3 {
        pool.initialize(test_unit_setup()).await.unwrap();
    }

    assert!(pool.is_initialized());
    assert_eq!(factory.state().prepares(), 1);
    assert_eq!(
        factory.state().prepared_setup().unwrap(),
        test_unit_setup()
    );
}

#[tokio::test]
async fn test_concurrent_initialize_prepares_once() {
    let factory = MockEngineFactory::new();
    let (pool, _) = pool_with(&factory, 1, None);

    let attempts = (0..8).map(|_| {
        let pool = pool.clone();
        tokio::spawn(async move { pool.initialize(test_unit_setup()).await })
    });
    for handle in futures::future::join_all(attempts).await {
        handle.unwrap().unwrap();
    }

    assert_eq!(factory.state().prepares(), 1);
}

#[tokio::test]
async fn test_new_unit_replays_registered_functions() {
    let factory = MockEngineFactory::new();
    let (pool, metadata) = pool_with(&factory, 1, None);
    pool.initialize(test_unit_setup()).await.unwrap();

    let lease = pool.checkout(&metadata).await.unwrap();

    let unit = lease.unit().unwrap();
    assert!(unit.is_initialized());
    assert!(unit.is_loaded("f1"));
    assert_eq!(factory.state().load_count(), 1);
    pool.reclaim(Some(lease)).await;
}

#[tokio::test]
async fn test_reclaim_returns_unit_for_reuse() {
    let factory = MockEngineFactory::new();
    let (pool, metadata) = pool_with(&factory, 2, None);
    pool.initialize(test_unit_setup()).await.unwrap();

    let first = pool.checkout(&metadata).await.unwrap();
    let first_id = first.unit_id();
    pool.reclaim(Some(first)).await;

    let second = pool.checkout(&metadata).await.unwrap();
    assert_eq!(second.unit_id(), first_id);
    pool.reclaim(Some(second)).await;

    let stats = pool.stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.checked_out, 0);
    assert_eq!(factory.state().reset_count(), 2);
}

#[tokio::test]
async fn test_reclaim_none_is_noop() {
    let factory = MockEngineFactory::new();
    let (pool, metadata) = pool_with(&factory, 1, None);
    pool.initialize(test_unit_setup()).await.unwrap();

    pool.reclaim(None).await;
    pool.reclaim(None).await;

    let stats = pool.stats();
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.idle, 0);

    // Capacity is untouched.
    let lease = pool.checkout(&metadata).await.unwrap();
    pool.reclaim(Some(lease)).await;
}

#[tokio::test]
async fn test_checkout_timeout_when_exhausted() {
    let factory = MockEngineFactory::new();
    let (pool, metadata) = pool_with(&factory, 1, Some(Duration::from_millis(50)));
    pool.initialize(test_unit_setup()).await.unwrap();

    let held = pool.checkout(&metadata).await.unwrap();
    let err = pool.checkout(&metadata).await.unwrap_err();

    assert!(matches!(err, WorkerError::PoolExhaustedTimeout { .. }));
    assert_eq!(pool.stats().checked_out, 1);

    pool.reclaim(Some(held)).await;
    let lease = pool.checkout(&metadata).await.unwrap();
    pool.reclaim(Some(lease)).await;
}

#[tokio::test]
async fn test_checkout_waits_for_reclaim() {
    let factory = MockEngineFactory::new();
    let (pool, metadata) = pool_with(&factory, 1, None);
    pool.initialize(test_unit_setup()).await.unwrap();

    let held = pool.checkout(&metadata).await.unwrap();
    let held_id = held.unit_id();

    let waiter = {
        let pool = pool.clone();
        let metadata = Arc::clone(&metadata);
        tokio::spawn(async move {
            let lease = pool.checkout(&metadata).await.unwrap();
            let id = lease.unit_id();
            pool.reclaim(Some(lease)).await;
            id
        })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    pool.reclaim(Some(held)).await;
    assert_eq!(waiter.await.unwrap(), held_id);
    assert_eq!(pool.stats().created, 1);
}

#[tokio::test]
async fn test_failed_reset_discards_unit() {
    let factory = MockEngineFactory::new().failing_reset();
    let (pool, metadata) = pool_with(&factory, 1, None);
    pool.initialize(test_unit_setup()).await.unwrap();

    let lease = pool.checkout(&metadata).await.unwrap();
    let discarded_id = lease.unit_id();
    pool.reclaim(Some(lease)).await;

    let stats = pool.stats();
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.checked_out, 0);
    assert_eq!(factory.state().dispose_count(), 1);

    factory.heal_reset();
    let fresh = pool.checkout(&metadata).await.unwrap();
    assert_ne!(fresh.unit_id(), discarded_id);
    assert_eq!(pool.stats().created, 2);
    pool.reclaim(Some(fresh)).await;
}

#[tokio::test]
async fn test_dropped_lease_discards_unit_and_frees_slot() {
    let factory = MockEngineFactory::new();
    let (pool, metadata) = pool_with(&factory, 1, Some(Duration::from_millis(200)));
    pool.initialize(test_unit_setup()).await.unwrap();

    let lease = pool.checkout(&metadata).await.unwrap();
    let dropped_id = lease.unit_id();
    drop(lease);

    let stats = pool.stats();
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.checked_out, 0);
    assert_eq!(stats.idle, 0);

    let fresh = pool.checkout(&metadata).await.unwrap();
    assert_ne!(fresh.unit_id(), dropped_id);
    pool.reclaim(Some(fresh)).await;
}

#[tokio::test]
async fn test_failed_load_keeps_unit_and_capacity() {
    let factory = MockEngineFactory::new().failing_load("bad");
    let (pool, metadata) = pool_with(&factory, 1, Some(Duration::from_millis(200)));
    pool.initialize(test_unit_setup()).await.unwrap();

    let lease = pool.checkout(&metadata).await.unwrap();
    pool.reclaim(Some(lease)).await;

    let bad = Arc::new(test_function_metadata("bad", "Bad", test_queue_bindings()));
    let err = pool.checkout(&bad).await.unwrap_err();
    assert!(matches!(err, WorkerError::LoadError { .. }));

    let stats = pool.stats();
    assert_eq!(stats.idle, 1);
    assert_eq!(stats.checked_out, 0);

    let lease = pool.checkout(&metadata).await.unwrap();
    pool.reclaim(Some(lease)).await;
}

#[tokio::test]
async fn test_concurrent_leases_hold_disjoint_units() {
    let factory = MockEngineFactory::new();
    let (pool, metadata) = pool_with(&factory, 3, None);
    pool.initialize(test_unit_setup()).await.unwrap();

    let a = pool.checkout(&metadata).await.unwrap();
    let b = pool.checkout(&metadata).await.unwrap();
    let c = pool.checkout(&metadata).await.unwrap();

    let ids: HashSet<_> = [a.unit_id(), b.unit_id(), c.unit_id()]
        .into_iter()
        .flatten()
        .collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(pool.stats().checked_out, 3);

    for lease in [a, b, c] {
        pool.reclaim(Some(lease)).await;
    }
    assert_eq!(pool.stats().idle, 3);
}

#[tokio::test]
async fn test_close_disposes_idle_and_refuses_checkout() {
    let factory = MockEngineFactory::new();
    let (pool, metadata) = pool_with(&factory, 2, None);
    pool.initialize(test_unit_setup()).await.unwrap();

    let a = pool.checkout(&metadata).await.unwrap();
    let b = pool.checkout(&metadata).await.unwrap();
    pool.reclaim(Some(a)).await;
    pool.reclaim(Some(b)).await;

    pool.close().await;

    assert_eq!(factory.state().dispose_count(), 2);
    assert_eq!(pool.stats().idle, 0);
    assert!(pool.checkout(&metadata).await.is_err());
}
