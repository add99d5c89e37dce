//! Error types for distributed lock operations.

use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during lock operations.
///
/// Acquisition failures stay distinguishable: a [`LockError::Timeout`] means
/// someone else holds the lock, a [`LockError::Unavailable`] says nothing about
/// who holds it.
#[derive(Error, Debug)]
pub enum LockError {
    /// The wait bound elapsed without the lock being granted.
    #[error("lock acquisition timed out after {0:?}")]
    Timeout(Duration),

    /// The coordination store could not be reached, or the session died while
    /// an acquisition was in flight.
    #[error("coordination store unavailable: {0}")]
    Unavailable(#[source] BoxError),

    /// The session backing a held lock is gone. The lock may already be
    /// granted to another holder.
    #[error("lock was lost: {0}")]
    LockLost(String),

    /// The store detected a deadlock between sessions.
    #[error("deadlock detected: {0}")]
    Deadlock(String),

    /// Invalid lock name.
    #[error("invalid lock name: {0}")]
    InvalidName(String),

    /// Invalid provider configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Backend-specific error.
    #[error("backend error: {0}")]
    Backend(#[source] BoxError),
}

impl LockError {
    /// Wraps any error as [`LockError::Unavailable`].
    pub fn unavailable(err: impl Into<BoxError>) -> Self {
        Self::Unavailable(err.into())
    }

    /// Wraps any error as [`LockError::Backend`].
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn is_lost(&self) -> bool {
        matches!(self, Self::LockLost(_))
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        assert!(LockError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(LockError::unavailable("connection refused").is_unavailable());
        assert!(LockError::LockLost("gone".to_string()).is_lost());
        assert!(!LockError::backend("boom").is_unavailable());
    }

    #[test]
    fn test_unavailable_keeps_source() {
        let err = LockError::unavailable(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert_eq!(err.to_string(), "coordination store unavailable: refused");
        assert!(std::error::Error::source(&err).is_some());
    }
}
