//! Resource lifecycle: the factory collaborator and per-resource metadata.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

/// Creates, validates and disposes of pooled resources.
///
/// The pool only ever calls [`create`](Self::create) when it has a free slot,
/// [`validate`](Self::validate) on an idle resource it is about to hand out
/// again, and [`close`](Self::close) when a resource leaves the pool for good.
/// Retry policy for failed creations belongs to the caller of
/// [`Pool::acquire`](crate::Pool::acquire), not to the factory or the pool.
///
/// # Example
///
/// ```rust,ignore
/// struct TcpFactory { addr: SocketAddr }
///
/// #[async_trait]
/// impl ResourceFactory for TcpFactory {
///     type Resource = TcpStream;
///     type Error = std::io::Error;
///
///     async fn create(&self) -> Result<TcpStream, std::io::Error> {
///         TcpStream::connect(self.addr).await
///     }
/// }
/// ```
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// The pooled resource type.
    type Resource: Send + 'static;

    /// Error produced when creating or closing a resource.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create a new resource.
    async fn create(&self) -> Result<Self::Resource, Self::Error>;

    /// Check whether an idle resource is still usable.
    ///
    /// Returning `false` makes the pool close the resource and hand out
    /// another one instead.
    async fn validate(&self, _resource: &mut Self::Resource) -> bool {
        true
    }

    /// Dispose of a resource.
    ///
    /// Called outside the pool lock. Failures are logged by the pool and never
    /// surfaced to the caller that triggered the close.
    fn close(&self, resource: Self::Resource) -> Result<(), Self::Error> {
        drop(resource);
        Ok(())
    }
}

/// Type-erased factory handle.
pub type DynResourceFactory<R, E> = Arc<dyn ResourceFactory<Resource = R, Error = E>>;

#[async_trait]
impl<F> ResourceFactory for Arc<F>
where
    F: ResourceFactory + ?Sized,
{
    type Resource = F::Resource;
    type Error = F::Error;

    async fn create(&self) -> Result<Self::Resource, Self::Error> {
        (**self).create().await
    }

    async fn validate(&self, resource: &mut Self::Resource) -> bool {
        (**self).validate(resource).await
    }

    fn close(&self, resource: Self::Resource) -> Result<(), Self::Error> {
        (**self).close(resource)
    }
}

/// Pool-unique identifier of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw identifier value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bookkeeping the pool keeps alongside each resource.
#[derive(Debug, Clone)]
pub struct ResourceMetadata {
    /// Identifier assigned at creation.
    pub id: ResourceId,
    /// When the resource was created.
    pub created_at: Instant,
    /// When the resource was last returned to the pool, if ever.
    pub last_released: Option<Instant>,
    /// How many times the resource has been leased out.
    pub lease_count: u64,
}

impl ResourceMetadata {
    pub(crate) fn new(id: ResourceId) -> Self {
        Self {
            id,
            created_at: Instant::now(),
            last_released: None,
            lease_count: 0,
        }
    }

    /// Time since the resource was created.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Time the resource has been sitting idle, if it has ever been returned.
    #[must_use]
    pub fn idle_time(&self) -> Option<Duration> {
        self.last_released.map(|at| at.elapsed())
    }
}
