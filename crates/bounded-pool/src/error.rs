//! Pool error types.

use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::ResourceId;

/// Errors returned by pool operations.
///
/// `E` is the error type of the [`ResourceFactory`](crate::ResourceFactory)
/// backing the pool. Creation failures carry it unchanged so callers can tell
/// "the factory is broken" apart from "the pool is merely busy".
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError<E> {
    /// The factory failed to create a new resource.
    #[error("resource creation failed: {0}")]
    Create(#[source] E),

    /// No resource became available within the requested wait.
    #[error("timed out after {waited:?} waiting for a pooled resource")]
    Timeout {
        /// How long the caller was willing to wait.
        waited: Duration,
    },

    /// The pool has been shut down.
    #[error("pool is closed")]
    Closed,

    /// A resource was released that is not currently leased from this pool.
    #[error("resource {id} is not leased from this pool")]
    InvalidRelease {
        /// Identifier of the rejected resource.
        id: ResourceId,
    },

    /// The pool configuration is invalid.
    #[error("invalid pool configuration: {0}")]
    Config(String),
}

impl<E> PoolError<E> {
    /// Returns `true` if this is a [`PoolError::Timeout`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a [`PoolError::Closed`].
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if the factory failed to create a resource.
    #[must_use]
    pub fn is_creation_failure(&self) -> bool {
        matches!(self, Self::Create(_))
    }

    /// Whether retrying the same operation later may succeed.
    ///
    /// Only timeouts qualify. Creation failures are left to the caller's own
    /// retry policy.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_timeout()
    }

    /// Extract the factory error, if this is a creation failure.
    pub fn into_create_error(self) -> Option<E> {
        match self {
            Self::Create(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error, PartialEq)]
    #[error("connection refused")]
    struct Refused;

    #[test]
    fn test_error_classification() {
        let timeout: PoolError<Refused> = PoolError::Timeout {
            waited: Duration::from_millis(100),
        };
        assert!(timeout.is_timeout());
        assert!(timeout.is_retryable());
        assert!(!timeout.is_closed());

        let closed: PoolError<Refused> = PoolError::Closed;
        assert!(closed.is_closed());
        assert!(!closed.is_retryable());

        let create = PoolError::Create(Refused);
        assert!(create.is_creation_failure());
        assert!(!create.is_retryable());
        assert_eq!(create.into_create_error(), Some(Refused));
    }

    #[test]
    fn test_error_display() {
        let err: PoolError<Refused> = PoolError::InvalidRelease {
            id: ResourceId::new(7),
        };
        assert_eq!(err.to_string(), "resource #7 is not leased from this pool");

        let err = PoolError::Create(Refused);
        assert_eq!(err.to_string(), "resource creation failed: connection refused");
    }

    #[test]
    fn test_create_error_source() {
        use std::error::Error as _;

        let err = PoolError::Create(Refused);
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("connection refused"));
    }
}
