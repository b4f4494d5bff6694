//! # bounded-pool-testing
//!
//! Test infrastructure for `bounded-pool`.
//!
//! [`MockFactory`] is an instrumented [`ResourceFactory`] that records every
//! creation and close, can be told to fail or slow down, and hands out
//! [`MockResource`]s that detect being used by two holders at once.
//!
//! ```rust,ignore
//! use bounded_pool::Pool;
//! use bounded_pool_testing::MockFactory;
//!
//! let factory = MockFactory::new();
//! let pool = Pool::builder(factory.clone()).max_size(2).build().await?;
//!
//! let lease = pool.acquire().await?;
//! let _in_use = lease.enter().expect("resource leased twice");
//! assert_eq!(factory.created(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bounded_pool::{ResourceFactory, async_trait};
use parking_lot::Mutex;
use thiserror::Error;

/// Errors produced by [`MockFactory`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MockError {
    /// Creation was configured to fail.
    #[error("mock resource creation failed")]
    CreateFailed,

    /// Close was configured to fail.
    #[error("mock resource close failed")]
    CloseFailed,
}

/// A resource handed out by [`MockFactory`].
#[derive(Debug)]
pub struct MockResource {
    id: u64,
    alive: Arc<AtomicBool>,
    in_use: AtomicBool,
}

impl MockResource {
    /// Identifier assigned by the factory, starting at 1.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the resource is still usable (not killed by the test).
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark the resource as in use.
    ///
    /// Returns `None` if someone else is already using it, which means the
    /// pool handed the same resource to two holders.
    pub fn enter(&self) -> Option<InUse<'_>> {
        if self.in_use.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(InUse { resource: self })
    }
}

/// Marker held while a [`MockResource`] is in use.
#[derive(Debug)]
pub struct InUse<'a> {
    resource: &'a MockResource,
}

impl Drop for InUse<'_> {
    fn drop(&mut self) {
        self.resource.in_use.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct MockState {
    next_id: AtomicU64,
    created: AtomicUsize,
    closed: AtomicUsize,
    pending_failures: AtomicUsize,
    offline: AtomicBool,
    fail_closes: AtomicBool,
    create_delay: Mutex<Option<Duration>>,
    alive: Mutex<HashMap<u64, Arc<AtomicBool>>>,
    close_counts: Mutex<HashMap<u64, u32>>,
}

/// Instrumented factory for pool tests.
///
/// Clones share state, so a test can keep one handle and give another to the
/// pool.
#[derive(Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    /// Create a factory that always succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every creation take `delay`.
    #[must_use]
    pub fn with_create_delay(self, delay: Duration) -> Self {
        *self.state.create_delay.lock() = Some(delay);
        self
    }

    /// Fail the next `count` creations.
    pub fn fail_next_creates(&self, count: usize) {
        self.state.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Fail every creation until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.state.offline.store(offline, Ordering::SeqCst);
    }

    /// Make closes report failure. The resource still counts as closed.
    pub fn fail_closes(&self, fail: bool) {
        self.state.fail_closes.store(fail, Ordering::SeqCst);
    }

    /// Break a resource so that validation rejects it.
    pub fn kill(&self, id: u64) {
        if let Some(alive) = self.state.alive.lock().get(&id) {
            alive.store(false, Ordering::SeqCst);
        }
    }

    /// Number of resources created so far.
    #[must_use]
    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    /// Number of close calls so far.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Resources created and not yet closed.
    #[must_use]
    pub fn live(&self) -> usize {
        self.created().saturating_sub(self.closed())
    }

    /// How many times the resource with `id` was closed.
    #[must_use]
    pub fn close_count(&self, id: u64) -> u32 {
        self.state.close_counts.lock().get(&id).copied().unwrap_or(0)
    }

    /// Identifiers of every closed resource, sorted.
    #[must_use]
    pub fn closed_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.state.close_counts.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn should_fail(&self) -> bool {
        if self.state.offline.load(Ordering::SeqCst) {
            return true;
        }
        self.state
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ResourceFactory for MockFactory {
    type Resource = MockResource;
    type Error = MockError;

    async fn create(&self) -> Result<MockResource, MockError> {
        let delay = *self.state.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail() {
            tracing::debug!("mock factory failing creation");
            return Err(MockError::CreateFailed);
        }

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let alive = Arc::new(AtomicBool::new(true));
        self.state.alive.lock().insert(id, Arc::clone(&alive));
        self.state.created.fetch_add(1, Ordering::SeqCst);

        Ok(MockResource {
            id,
            alive,
            in_use: AtomicBool::new(false),
        })
    }

    async fn validate(&self, resource: &mut MockResource) -> bool {
        resource.is_alive()
    }

    fn close(&self, resource: MockResource) -> Result<(), MockError> {
        *self.state.close_counts.lock().entry(resource.id).or_insert(0) += 1;
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        resource.alive.store(false, Ordering::SeqCst);

        if self.state.fail_closes.load(Ordering::SeqCst) {
            return Err(MockError::CloseFailed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_counts() {
        let factory = MockFactory::new();
        let a = factory.create().await.unwrap();
        let b = factory.create().await.unwrap();
        assert_eq!((a.id(), b.id()), (1, 2));
        assert_eq!(factory.created(), 2);

        factory.close(a).unwrap();
        assert_eq!(factory.live(), 1);
        assert_eq!(factory.close_count(1), 1);
        assert_eq!(factory.closed_ids(), vec![1]);
    }

    #[tokio::test]
    async fn test_mock_failures() {
        let factory = MockFactory::new();
        factory.fail_next_creates(1);
        assert_eq!(factory.create().await.unwrap_err(), MockError::CreateFailed);
        assert!(factory.create().await.is_ok());

        factory.set_offline(true);
        assert!(factory.create().await.is_err());
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn test_mock_kill_fails_validation() {
        let factory = MockFactory::new();
        let mut resource = factory.create().await.unwrap();
        assert!(factory.validate(&mut resource).await);

        factory.kill(resource.id());
        assert!(!factory.validate(&mut resource).await);
    }

    #[tokio::test]
    async fn test_enter_detects_double_use() {
        let factory = MockFactory::new();
        let resource = factory.create().await.unwrap();

        let first = resource.enter();
        assert!(first.is_some());
        assert!(resource.enter().is_none());
        drop(first);
        assert!(resource.enter().is_some());
    }
}
