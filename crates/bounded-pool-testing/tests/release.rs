//! Release validation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use bounded_pool::{Pool, PoolConfig, PoolError};
use bounded_pool_testing::MockFactory;

async fn new_pool(factory: &MockFactory) -> Pool<MockFactory> {
    Pool::new(factory.clone(), PoolConfig::new().max_size(2))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_release_into_foreign_pool_rejected() {
    let home_factory = MockFactory::new();
    let foreign_factory = MockFactory::new();
    let home = new_pool(&home_factory).await;
    let foreign = new_pool(&foreign_factory).await;

    let _own = foreign.acquire().await.unwrap();
    let before = foreign.status();

    let lease = home.acquire().await.unwrap();
    let id = lease.metadata().id;
    let err = foreign.release(lease).unwrap_err();

    assert!(matches!(err, PoolError::InvalidRelease { id: rejected } if rejected == id));
    assert_eq!(foreign.status(), before, "foreign pool accounting is untouched");
    assert_eq!(foreign.metrics().invalid_releases, 1);

    // The rejected lease went back to where it came from.
    let status = home.status();
    assert_eq!((status.available, status.in_use, status.total), (1, 0, 1));
    assert_eq!(home_factory.closed(), 0);
}

#[tokio::test]
async fn test_release_after_foreign_rejection_still_works() {
    let factory = MockFactory::new();
    let home = new_pool(&factory).await;
    let foreign = new_pool(&MockFactory::new()).await;

    let lease = home.acquire().await.unwrap();
    assert!(foreign.release(lease).is_err());

    let lease = home.acquire().await.unwrap();
    assert_eq!(lease.metadata().lease_count, 2);
    home.release(lease).unwrap();
    assert_eq!(home.available_count(), 1);
    assert_eq!(factory.created(), 1);
}

#[tokio::test]
async fn test_release_makes_resource_immediately_available() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), PoolConfig::new().max_size(1))
        .await
        .unwrap();

    let lease = pool.acquire().await.unwrap();
    pool.release(lease).unwrap();

    let again = pool
        .acquire_within(Some(std::time::Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(again.id(), 1);
    assert!(again.metadata().last_released.is_some());
}
