//! Factories that hand out locks by name.

use std::future::Future;
use std::time::Duration;

use crate::backend::LockBackend;
use crate::error::LockResult;
use crate::handle::LockHandle;
use crate::lock::DistributedLock;
use crate::timeout::Timeout;

/// Factory for creating distributed locks by name.
///
/// Providers encapsulate backend configuration, allowing application code
/// to be backend-agnostic.
///
/// # Example
///
/// ```rust,ignore
/// // Configure once at startup
/// let provider = PostgresLockProvider::new(connection_string).await?;
///
/// // Create locks by name anywhere in the application
/// let lock = provider.create_lock("my-resource")?;
/// let handle = lock.acquire(None).await?;
/// ```
pub trait LockProvider: Send + Sync {
    /// The backend every created lock runs on.
    type Backend: LockBackend;

    /// Creates a lock with the given name.
    ///
    /// Fails with [`LockError::InvalidName`](crate::LockError::InvalidName)
    /// when the backend cannot encode `name`.
    fn create_lock(&self, name: &str) -> LockResult<DistributedLock<Self::Backend>>;
}

/// Extension trait providing convenience methods for lock providers.
pub trait LockProviderExt: LockProvider {
    /// Acquires a lock by name, returning the handle.
    ///
    /// Convenience method combining `create_lock` and `acquire`.
    fn acquire_lock(
        &self,
        name: &str,
        timeout: Timeout,
    ) -> impl Future<Output = LockResult<LockHandle<Self::Backend>>> + Send
    where
        Self: Sync,
    {
        async move {
            let lock = self.create_lock(name)?;
            lock.acquire(timeout).await
        }
    }

    /// Tries to acquire a lock by name, waiting up to `timeout`.
    ///
    /// Convenience method combining `create_lock` and `try_acquire`.
    fn try_acquire_lock(
        &self,
        name: &str,
        timeout: Duration,
    ) -> impl Future<Output = LockResult<Option<LockHandle<Self::Backend>>>> + Send
    where
        Self: Sync,
    {
        async move {
            let lock = self.create_lock(name)?;
            lock.try_acquire(timeout).await
        }
    }
}

// Blanket implementation for all LockProviders
impl<T: LockProvider> LockProviderExt for T {}
