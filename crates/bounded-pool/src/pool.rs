//! Resource pool implementation.
//!
//! Capacity is tracked with a [`Semaphore`] holding one permit per lease slot.
//! A permit is forgotten when a resource is leased out and added back when the
//! lease is returned, so waiting for a free slot is a single semaphore wait and
//! closing the semaphore on shutdown wakes every waiter at once.
//!
//! Waiters are currently woken in the semaphore's queue order, but FIFO
//! ordering is not part of the contract.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hashbrown::HashSet;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::{ResourceFactory, ResourceId, ResourceMetadata};

/// A bounded pool of reusable resources.
///
/// The pool creates resources lazily through its [`ResourceFactory`], never
/// keeps more than `max_size` of them alive at once, and hands each one to at
/// most one caller at a time. Idle resources are reused most-recently-returned
/// first.
///
/// `Pool` is a cheap handle: clones share the same underlying pool.
///
/// # Example
///
/// ```rust,ignore
/// use bounded_pool::Pool;
/// use std::time::Duration;
///
/// let pool = Pool::builder(factory)
///     .max_size(20)
///     .initial_size(2)
///     .acquire_timeout(Some(Duration::from_secs(5)))
///     .build()
///     .await?;
///
/// let conn = pool.acquire().await?;
/// // Use connection...
/// // Returned to the pool on drop, or explicitly:
/// pool.release(conn)?;
/// ```
pub struct Pool<F: ResourceFactory> {
    inner: Arc<PoolInner<F>>,
}

struct PoolInner<F: ResourceFactory> {
    factory: F,

    config: PoolConfig,

    /// Lease slots; `max_size` minus leased resources and pending checkouts.
    permits: Semaphore,

    state: Mutex<PoolState<F::Resource>>,

    next_resource_id: AtomicU64,

    created_at: Instant,

    metrics: Mutex<PoolMetricsInner>,
}

struct PoolState<R> {
    /// Idle resources; the most recently returned one is on top.
    idle: Vec<Slot<R>>,
    /// Resources currently out of the pool, including ones being validated.
    leased: HashSet<ResourceId>,
    closed: bool,
}

impl<R> PoolState<R> {
    fn total(&self) -> usize {
        self.idle.len() + self.leased.len()
    }
}

struct Slot<R> {
    resource: R,
    metadata: ResourceMetadata,
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    resources_created: u64,
    resources_closed: u64,
    resources_detached: u64,
    acquires_successful: u64,
    acquires_failed: u64,
    acquire_timeouts: u64,
    validations_performed: u64,
    validations_failed: u64,
    close_failures: u64,
    invalid_releases: u64,
}

impl<F: ResourceFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFactory> fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<F: ResourceFactory> Pool<F> {
    /// Create a new pool builder around `factory`.
    #[must_use]
    pub fn builder(factory: F) -> PoolBuilder<F> {
        PoolBuilder::new(factory)
    }

    /// Create a new pool with the given configuration.
    ///
    /// `initial_size` resources are created before this returns. If any of
    /// them fails, the ones already created are closed and the factory error
    /// is returned.
    pub async fn new(factory: F, config: PoolConfig) -> Result<Self, PoolError<F::Error>> {
        config.validate()?;

        let pool = Self {
            inner: Arc::new(PoolInner {
                factory,
                permits: Semaphore::new(config.max_size),
                state: Mutex::new(PoolState {
                    idle: Vec::with_capacity(config.max_size),
                    leased: HashSet::with_capacity(config.max_size),
                    closed: false,
                }),
                next_resource_id: AtomicU64::new(1),
                created_at: Instant::now(),
                metrics: Mutex::new(PoolMetricsInner::default()),
                config,
            }),
        };

        for _ in 0..pool.inner.config.initial_size {
            match pool.inner.create().await {
                Ok(mut slot) => {
                    slot.metadata.last_released = Some(Instant::now());
                    pool.inner.state.lock().idle.push(slot);
                }
                Err(e) => {
                    pool.shutdown();
                    return Err(e);
                }
            }
        }

        tracing::info!(
            initial = pool.inner.config.initial_size,
            max = pool.inner.config.max_size,
            "resource pool created"
        );

        Ok(pool)
    }

    /// Acquire a resource, waiting up to the configured `acquire_timeout`.
    pub async fn acquire(&self) -> Result<PooledResource<F>, PoolError<F::Error>> {
        self.acquire_within(self.inner.config.acquire_timeout).await
    }

    /// Acquire a resource, waiting at most `timeout` for one to free up.
    ///
    /// An idle resource is returned if there is one; otherwise a new one is
    /// created if the pool is below capacity. When the pool is at capacity
    /// the call waits for a release. `Some(Duration::ZERO)` never waits and
    /// `None` waits indefinitely.
    ///
    /// The wait ends early with [`PoolError::Closed`] if the pool is shut
    /// down. Factory errors are returned as [`PoolError::Create`] and are
    /// never retried by the pool.
    ///
    /// Dropping the returned future at any point leaves the pool unchanged. An
    /// idle resource whose validation is interrupted this way goes back to
    /// the pool; only a resource that fails validation is closed.
    pub async fn acquire_within(
        &self,
        timeout: Option<Duration>,
    ) -> Result<PooledResource<F>, PoolError<F::Error>> {
        tracing::trace!(timeout = ?timeout, "acquiring resource from pool");

        match self.checkout(timeout).await {
            Ok(lease) => Ok(lease),
            Err(e) => {
                {
                    let mut metrics = self.inner.metrics.lock();
                    metrics.acquires_failed += 1;
                    if e.is_timeout() {
                        metrics.acquire_timeouts += 1;
                    }
                }
                tracing::debug!(error = %e, "resource acquisition failed");
                Err(e)
            }
        }
    }

    async fn checkout(
        &self,
        timeout: Option<Duration>,
    ) -> Result<PooledResource<F>, PoolError<F::Error>> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permit = self.wait_for_slot(timeout).await?;

        loop {
            let idle = {
                let mut state = self.inner.state.lock();
                if state.closed {
                    return Err(PoolError::Closed);
                }
                let slot = state.idle.pop();
                if let Some(slot) = &slot {
                    state.leased.insert(slot.metadata.id);
                }
                slot
            };

            let Some(slot) = idle else {
                let slot = self.inner.create().await?;
                return self.lease(permit, slot);
            };

            let mut pending = PendingCheckout {
                pool: &self.inner,
                slot: Some(slot),
            };
            if self.inner.config.validate_on_acquire && !self.inner.validate(&mut pending).await {
                pending.discard();
                continue;
            }
            if let Some(slot) = pending.disarm() {
                return self.lease(permit, slot);
            }
        }
    }

    async fn wait_for_slot(
        &self,
        timeout: Option<Duration>,
    ) -> Result<SemaphorePermit<'_>, PoolError<F::Error>> {
        let permits = &self.inner.permits;

        let deadline = match timeout {
            Some(waited) if waited.is_zero() => {
                return permits.try_acquire().map_err(|e| match e {
                    TryAcquireError::Closed => PoolError::Closed,
                    TryAcquireError::NoPermits => PoolError::Timeout { waited },
                });
            }
            Some(waited) => tokio::time::Instant::now()
                .checked_add(waited)
                .map(|deadline| (deadline, waited)),
            None => None,
        };

        match deadline {
            Some((deadline, waited)) => {
                match tokio::time::timeout_at(deadline, permits.acquire()).await {
                    Ok(permit) => permit.map_err(|_| PoolError::Closed),
                    Err(_) => Err(PoolError::Timeout { waited }),
                }
            }
            None => permits.acquire().await.map_err(|_| PoolError::Closed),
        }
    }

    fn lease(
        &self,
        permit: SemaphorePermit<'_>,
        mut slot: Slot<F::Resource>,
    ) -> Result<PooledResource<F>, PoolError<F::Error>> {
        let id = slot.metadata.id;
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                state.leased.remove(&id);
                drop(state);
                self.inner.close(slot);
                return Err(PoolError::Closed);
            }
            state.leased.insert(id);
        }

        // The slot stays taken until the lease comes back.
        permit.forget();

        slot.metadata.lease_count += 1;
        self.inner.metrics.lock().acquires_successful += 1;
        tracing::trace!(resource_id = id.get(), "resource leased");

        Ok(PooledResource {
            slot: Some(slot),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Return a leased resource to the pool.
    ///
    /// Equivalent to dropping the lease, except that a lease belonging to a
    /// different pool is reported as [`PoolError::InvalidRelease`]. Such a
    /// lease is sent back to the pool it came from and this pool's state is
    /// left untouched.
    pub fn release(&self, mut lease: PooledResource<F>) -> Result<(), PoolError<F::Error>> {
        if !Arc::ptr_eq(&self.inner, &lease.pool) {
            let id = lease.metadata().id;
            self.inner.metrics.lock().invalid_releases += 1;
            tracing::error!(
                resource_id = id.get(),
                "release of a resource leased from another pool"
            );
            return Err(PoolError::InvalidRelease { id });
        }

        if let Some(slot) = lease.slot.take() {
            self.inner.give_back(slot);
        }
        Ok(())
    }

    /// Shut down the pool.
    ///
    /// Idle resources are closed immediately and every waiting
    /// [`acquire`](Self::acquire) fails with [`PoolError::Closed`]. Leased
    /// resources are closed as they are returned. Calling this again is a
    /// no-op.
    pub fn shutdown(&self) {
        let (idle, outstanding) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            (std::mem::take(&mut state.idle), state.leased.len())
        };

        self.inner.permits.close();

        tracing::info!(
            idle = idle.len(),
            outstanding = outstanding,
            "resource pool shutting down"
        );

        for slot in idle {
            self.inner.close(slot);
        }
    }

    /// Check if the pool has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Number of idle resources ready to be leased.
    ///
    /// A snapshot for monitoring; it may be stale as soon as it is returned.
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            available: state.idle.len(),
            in_use: state.leased.len(),
            total: state.total(),
            max: self.inner.config.max_size,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            resources_created: inner.resources_created,
            resources_closed: inner.resources_closed,
            resources_detached: inner.resources_detached,
            acquires_successful: inner.acquires_successful,
            acquires_failed: inner.acquires_failed,
            acquire_timeouts: inner.acquire_timeouts,
            validations_performed: inner.validations_performed,
            validations_failed: inner.validations_failed,
            close_failures: inner.close_failures,
            invalid_releases: inner.invalid_releases,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Get the factory backing this pool.
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.inner.factory
    }
}

impl<F: ResourceFactory> PoolInner<F> {
    async fn create(&self) -> Result<Slot<F::Resource>, PoolError<F::Error>> {
        let resource = self.factory.create().await.map_err(PoolError::Create)?;

        let id = ResourceId::new(self.next_resource_id.fetch_add(1, Ordering::Relaxed));
        self.metrics.lock().resources_created += 1;
        tracing::debug!(resource_id = id.get(), "created pooled resource");

        Ok(Slot {
            resource,
            metadata: ResourceMetadata::new(id),
        })
    }

    async fn validate(&self, pending: &mut PendingCheckout<'_, F>) -> bool {
        let Some(slot) = pending.slot.as_mut() else {
            return false;
        };

        let valid = self.factory.validate(&mut slot.resource).await;
        {
            let mut metrics = self.metrics.lock();
            metrics.validations_performed += 1;
            if !valid {
                metrics.validations_failed += 1;
            }
        }
        if !valid {
            tracing::warn!(
                resource_id = slot.metadata.id.get(),
                "discarding idle resource that failed validation"
            );
        }
        valid
    }

    fn give_back(&self, mut slot: Slot<F::Resource>) {
        let id = slot.metadata.id;
        let mut state = self.state.lock();

        let was_leased = state.leased.remove(&id);
        debug_assert!(was_leased, "resource {id} returned without being leased");

        if state.closed {
            drop(state);
            self.close(slot);
            return;
        }

        slot.metadata.last_released = Some(Instant::now());
        state.idle.push(slot);
        drop(state);

        self.permits.add_permits(1);
        tracing::trace!(resource_id = id.get(), "resource returned to pool");
    }

    fn detach(&self, id: ResourceId) {
        let closed = {
            let mut state = self.state.lock();
            state.leased.remove(&id);
            state.closed
        };
        if !closed {
            self.permits.add_permits(1);
        }

        self.metrics.lock().resources_detached += 1;
        tracing::debug!(resource_id = id.get(), "resource detached from pool");
    }

    /// Remove a resource that was taken out for validation and close it.
    fn discard(&self, slot: Slot<F::Resource>) {
        self.state.lock().leased.remove(&slot.metadata.id);
        self.close(slot);
    }

    /// Put back a resource whose checkout was abandoned before it was leased.
    /// The caller's permit is returned separately when it is dropped.
    fn restore(&self, slot: Slot<F::Resource>) {
        let id = slot.metadata.id;
        let mut state = self.state.lock();
        state.leased.remove(&id);
        if state.closed {
            drop(state);
            self.close(slot);
            return;
        }
        state.idle.push(slot);
        drop(state);
        tracing::trace!(resource_id = id.get(), "abandoned checkout returned to pool");
    }

    /// Close a resource that is no longer tracked. Must be called without the
    /// state lock held.
    fn close(&self, slot: Slot<F::Resource>) {
        let id = slot.metadata.id;
        let result = self.factory.close(slot.resource);

        let mut metrics = self.metrics.lock();
        metrics.resources_closed += 1;
        match result {
            Ok(()) => {
                drop(metrics);
                tracing::debug!(resource_id = id.get(), "closed pooled resource");
            }
            Err(e) => {
                metrics.close_failures += 1;
                drop(metrics);
                tracing::warn!(resource_id = id.get(), error = %e, "failed to close pooled resource");
            }
        }
    }
}

impl<F: ResourceFactory> Drop for PoolInner<F> {
    fn drop(&mut self) {
        let idle = std::mem::take(&mut self.state.get_mut().idle);
        for slot in idle {
            self.close(slot);
        }
    }
}

/// An idle resource taken out of the pool but not yet handed to the caller.
///
/// A resource that failed validation is closed through
/// [`discard`](Self::discard). If the acquiring future is cancelled instead,
/// dropping the checkout puts the resource back on the idle stack.
struct PendingCheckout<'a, F: ResourceFactory> {
    pool: &'a PoolInner<F>,
    slot: Option<Slot<F::Resource>>,
}

impl<F: ResourceFactory> PendingCheckout<'_, F> {
    fn disarm(mut self) -> Option<Slot<F::Resource>> {
        self.slot.take()
    }

    fn discard(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.discard(slot);
        }
    }
}

impl<F: ResourceFactory> Drop for PendingCheckout<'_, F> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.restore(slot);
        }
    }
}

/// Builder for creating a resource pool.
///
/// # Example
///
/// ```rust,ignore
/// let pool = Pool::builder(factory)
///     .max_size(8)
///     .validate_on_acquire(false)
///     .build()
///     .await?;
/// ```
pub struct PoolBuilder<F> {
    factory: F,
    pool_config: PoolConfig,
}

impl<F: ResourceFactory> PoolBuilder<F> {
    /// Create a new pool builder with default settings.
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            pool_config: PoolConfig::default(),
        }
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the maximum number of resources.
    #[must_use]
    pub fn max_size(mut self, size: usize) -> Self {
        self.pool_config.max_size = size;
        self
    }

    /// Set the number of resources created up front.
    #[must_use]
    pub fn initial_size(mut self, size: usize) -> Self {
        self.pool_config.initial_size = size;
        self
    }

    /// Set the default acquire timeout. `None` waits indefinitely.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pool_config.acquire_timeout = timeout;
        self
    }

    /// Enable or disable validation of idle resources on acquire.
    #[must_use]
    pub fn validate_on_acquire(mut self, enabled: bool) -> Self {
        self.pool_config.validate_on_acquire = enabled;
        self
    }

    /// Build the pool.
    pub async fn build(self) -> Result<Pool<F>, PoolError<F::Error>> {
        Pool::new(self.factory, self.pool_config).await
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle resources available.
    pub available: usize,
    /// Number of resources currently leased.
    pub in_use: usize,
    /// Total number of live resources.
    pub total: usize,
    /// Maximum allowed resources.
    pub max: usize,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (self.in_use as f64 / self.max as f64) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total resources created since pool start.
    pub resources_created: u64,
    /// Total resources closed since pool start.
    pub resources_closed: u64,
    /// Resources permanently taken out of the pool by their holder.
    pub resources_detached: u64,
    /// Successful acquisitions.
    pub acquires_successful: u64,
    /// Failed acquisitions (timeouts, pool closed, creation errors).
    pub acquires_failed: u64,
    /// Acquisitions that gave up waiting.
    pub acquire_timeouts: u64,
    /// Idle-resource validations performed.
    pub validations_performed: u64,
    /// Validations that rejected the resource.
    pub validations_failed: u64,
    /// Closes the factory reported as failed.
    pub close_failures: u64,
    /// Rejected releases.
    pub invalid_releases: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate acquire success rate (0.0 to 1.0).
    #[must_use]
    pub fn acquire_success_rate(&self) -> f64 {
        let total = self.acquires_successful + self.acquires_failed;
        if total == 0 {
            return 1.0;
        }
        self.acquires_successful as f64 / total as f64
    }

    /// Calculate validation success rate (0.0 to 1.0).
    #[must_use]
    pub fn validation_success_rate(&self) -> f64 {
        if self.validations_performed == 0 {
            return 1.0;
        }
        let successful = self.validations_performed - self.validations_failed;
        successful as f64 / self.validations_performed as f64
    }
}

/// A resource leased from the pool.
///
/// Dereferences to the underlying resource. When dropped, the resource is
/// returned to the pool (or closed, if the pool has been shut down).
/// Use [`detach()`](PooledResource::detach) to keep it for good.
pub struct PooledResource<F: ResourceFactory> {
    /// `None` only once the lease has been released or detached.
    slot: Option<Slot<F::Resource>>,
    /// The pool the resource goes back to.
    pool: Arc<PoolInner<F>>,
}

impl<F: ResourceFactory> PooledResource<F> {
    // `slot` is only emptied by `detach`, `release` and `Drop`, all of which
    // consume the lease.
    fn slot(&self) -> &Slot<F::Resource> {
        match &self.slot {
            Some(slot) => slot,
            None => unreachable!("lease used after release"),
        }
    }

    fn slot_mut(&mut self) -> &mut Slot<F::Resource> {
        match &mut self.slot {
            Some(slot) => slot,
            None => unreachable!("lease used after release"),
        }
    }

    /// Get the resource metadata.
    #[must_use]
    pub fn metadata(&self) -> &ResourceMetadata {
        &self.slot().metadata
    }

    /// Detach the resource from the pool.
    ///
    /// The resource is no longer counted against the pool's capacity and
    /// will not be closed by it; the caller now owns it.
    #[must_use]
    pub fn detach(mut self) -> F::Resource {
        let Some(slot) = self.slot.take() else {
            unreachable!("lease used after release");
        };
        self.pool.detach(slot.metadata.id);
        slot.resource
    }
}

impl<F: ResourceFactory> Deref for PooledResource<F> {
    type Target = F::Resource;

    fn deref(&self) -> &Self::Target {
        &self.slot().resource
    }
}

impl<F: ResourceFactory> DerefMut for PooledResource<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slot_mut().resource
    }
}

impl<F> fmt::Debug for PooledResource<F>
where
    F: ResourceFactory,
    F::Resource: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PooledResource");
        if let Some(slot) = &self.slot {
            s.field("resource", &slot.resource)
                .field("metadata", &slot.metadata);
        }
        s.finish()
    }
}

impl<F: ResourceFactory> Drop for PooledResource<F> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.give_back(slot);
        }
    }
}
