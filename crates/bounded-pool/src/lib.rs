//! # bounded-pool
//!
//! Bounded async pool for expensive, reusable resources such as network
//! connections.
//!
//! The pool creates resources lazily through a [`ResourceFactory`], never keeps
//! more than `max_size` of them alive, and lends each one to at most one caller
//! at a time. Callers that arrive while every resource is leased wait for a
//! release, bounded by a timeout.
//!
//! ## Features
//!
//! - Blocking acquisition with per-call or configured timeouts
//! - Fail-fast acquisition with a zero timeout
//! - LIFO reuse of idle resources
//! - Optional validation of idle resources before reuse
//! - Eager creation of an initial set of resources
//! - Orderly shutdown: idle resources closed at once, leased ones on return
//! - Status snapshots and metrics for observability
//!
//! ## Example
//!
//! ```rust,ignore
//! use bounded_pool::{Pool, PoolConfig};
//! use std::time::Duration;
//!
//! // Using the builder pattern
//! let pool = Pool::builder(factory)
//!     .initial_size(2)
//!     .max_size(20)
//!     .acquire_timeout(Some(Duration::from_secs(5)))
//!     .build()
//!     .await?;
//!
//! // Or using PoolConfig directly
//! let config = PoolConfig::from_settings("Max Size=20;Acquire Timeout=5000")?;
//! let pool = Pool::new(factory, config).await?;
//!
//! // Get a resource from the pool
//! let conn = pool.acquire().await?;
//! // Use resource...
//! // Resource automatically returned to pool on drop
//!
//! // Check pool status
//! let status = pool.status();
//! println!("Pool utilization: {:.1}%", status.utilization());
//!
//! // Get metrics
//! let metrics = pool.metrics();
//! println!("Acquire success rate: {:.2}", metrics.acquire_success_rate());
//!
//! pool.shutdown();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pool;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::PoolError;

// Pool types
pub use pool::{Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledResource};

// Lifecycle management
pub use lifecycle::{DynResourceFactory, ResourceFactory, ResourceId, ResourceMetadata};

// Re-exported so factories can be implemented without a direct dependency.
pub use async_trait::async_trait;
