//! Shutdown and drain behaviour.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use bounded_pool::{Pool, PoolConfig, PoolError};
use bounded_pool_testing::MockFactory;
use tokio::time::Instant;

#[tokio::test]
async fn test_shutdown_closes_idle_exactly_once() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), PoolConfig::new().max_size(3).initial_size(3))
        .await
        .unwrap();
    assert_eq!(pool.available_count(), 3);

    pool.shutdown();

    assert_eq!(pool.available_count(), 0);
    assert_eq!(factory.closed(), 3);
    assert_eq!(factory.closed_ids(), vec![1, 2, 3]);
    for id in 1..=3 {
        assert_eq!(factory.close_count(id), 1, "resource {id} closed more than once");
    }

    // Idempotent.
    pool.shutdown();
    assert_eq!(factory.closed(), 3);
    assert!(pool.is_closed());
}

#[tokio::test]
async fn test_acquire_after_shutdown_fails_immediately() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), PoolConfig::new().max_size(2))
        .await
        .unwrap();
    pool.shutdown();

    let start = std::time::Instant::now();
    let err = pool.acquire_within(None).await.unwrap_err();
    assert!(err.is_closed());
    assert!(start.elapsed() < Duration::from_millis(50));
    assert_eq!(factory.created(), 0, "no resource is created after shutdown");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_wakes_blocked_waiters() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), PoolConfig::new().max_size(1))
        .await
        .unwrap();
    let _held = pool.acquire().await.unwrap();

    let mut waiters = Vec::new();
    for _ in 0..3 {
        let pool = pool.clone();
        waiters.push(tokio::spawn(async move {
            let start = Instant::now();
            let result = pool.acquire_within(Some(Duration::from_secs(60))).await;
            (result.map(|lease| lease.id()), start.elapsed())
        }));
    }

    tokio::time::sleep(Duration::from_millis(10)).await;
    pool.shutdown();

    for waiter in waiters {
        let (result, waited) = waiter.await.unwrap();
        assert!(matches!(result, Err(PoolError::Closed)));
        assert!(waited < Duration::from_secs(1), "waiter woke after {waited:?}");
    }
    assert_eq!(pool.metrics().acquires_failed, 3);
}

#[tokio::test]
async fn test_leased_resources_drain_on_release() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), PoolConfig::new().max_size(3))
        .await
        .unwrap();

    let a = pool.acquire().await.unwrap();
    let b = pool.acquire().await.unwrap();
    drop(pool.acquire().await.unwrap());
    assert_eq!(pool.status().total, 3);

    pool.shutdown();
    assert_eq!(factory.closed(), 1, "only the idle resource is closed");
    assert!(a.is_alive(), "leased resources are not closed under their holder");
    assert_eq!(pool.status().total, 2);

    let a_id = a.id();
    pool.release(a).unwrap();
    assert_eq!(factory.close_count(a_id), 1);
    assert_eq!(pool.status().total, 1);
    assert_eq!(pool.available_count(), 0, "released resources do not become idle");

    drop(b);
    let status = pool.status();
    assert_eq!((status.available, status.in_use, status.total), (0, 0, 0));
    assert_eq!(factory.live(), 0);
    assert_eq!(factory.created(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_resource_created_during_shutdown_is_closed() {
    let factory = MockFactory::new().with_create_delay(Duration::from_millis(100));
    let pool = Pool::new(factory.clone(), PoolConfig::new().max_size(1))
        .await
        .unwrap();

    let acquiring = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await.map(|lease| lease.id()) })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    pool.shutdown();

    let result = acquiring.await.unwrap();
    assert!(matches!(result, Err(PoolError::Closed)));
    assert_eq!(factory.created(), 1);
    assert_eq!(factory.close_count(1), 1);
    assert_eq!(pool.status().total, 0);
}

#[tokio::test]
async fn test_close_failures_are_counted_not_raised() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), PoolConfig::new().max_size(2).initial_size(1))
        .await
        .unwrap();
    let lease = pool.acquire_within(Some(Duration::ZERO)).await.unwrap();
    let spare = pool.acquire_within(Some(Duration::ZERO)).await.unwrap();
    drop(spare);

    factory.fail_closes(true);
    pool.shutdown();
    pool.release(lease).unwrap();

    let metrics = pool.metrics();
    assert_eq!(metrics.resources_closed, 2);
    assert_eq!(metrics.close_failures, 2);
    assert_eq!(pool.status().total, 0);
}

#[tokio::test]
async fn test_dropping_pool_closes_idle_resources() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), PoolConfig::new().max_size(2).initial_size(2))
        .await
        .unwrap();
    let lease = pool.acquire().await.unwrap();

    drop(pool);
    assert_eq!(factory.closed(), 0, "an outstanding lease keeps the pool alive");

    drop(lease);
    assert_eq!(factory.closed(), 2);
}
