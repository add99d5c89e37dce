//! The named distributed lock.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::field::Empty;
use tracing::{debug, instrument, Span};

use crate::backend::LockBackend;
use crate::error::{LockError, LockResult};
use crate::handle::LockHandle;
use crate::name::validate_name;
use crate::options::LockOptions;
use crate::timeout::{Timeout, TimeoutValue};

/// A distributed mutual exclusion lock.
///
/// Provides exclusive access to a resource identified by `name` across
/// processes and machines. Exclusion is enforced by the coordination store
/// behind `B`; this type keeps no in-process record of who holds what.
///
/// Every acquisition opens its own session, so two acquisitions of the same
/// name from the same process contend like any other pair. Nested acquisition
/// of a name the caller already holds waits for itself: without a timeout it
/// never returns.
///
/// # Example
///
/// ```rust,ignore
/// let lock = DistributedLock::new("inventory-restock", backend)?;
/// let mut handle = lock.acquire(Some(Duration::from_secs(10))).await?;
/// restock().await;
/// handle.release().await?;
/// ```
pub struct DistributedLock<B: LockBackend> {
    name: String,
    key: B::Key,
    backend: Arc<B>,
    options: LockOptions,
}

impl<B: LockBackend> DistributedLock<B> {
    /// Creates a lock named `name` on `backend` with default options.
    pub fn new(name: impl Into<String>, backend: Arc<B>) -> LockResult<Self> {
        Self::with_options(name, backend, LockOptions::default())
    }

    pub fn with_options(
        name: impl Into<String>,
        backend: Arc<B>,
        options: LockOptions,
    ) -> LockResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        let key = backend.encode_key(&name)?;
        Ok(Self {
            name,
            key,
            backend,
            options,
        })
    }

    /// Returns the unique name identifying this lock.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the store-side key `name` maps to.
    pub fn key(&self) -> &B::Key {
        &self.key
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Acquires the lock, waiting up to `timeout`.
    ///
    /// `None` waits indefinitely; `Some(Duration::ZERO)` makes one attempt.
    ///
    /// # Returns
    ///
    /// * `Ok(handle)` - the caller now holds the lock everywhere the store is shared
    /// * `Err(LockError::Timeout)` - the wait bound elapsed; someone else holds it
    /// * `Err(LockError::Unavailable)` - no session could be established, or the
    ///   store stopped answering
    #[instrument(
        skip(self),
        fields(lock.name = %self.name, backend = self.backend.kind(), timeout = ?timeout, acquired = Empty, elapsed_ms = Empty)
    )]
    pub async fn acquire(&self, timeout: Timeout) -> LockResult<LockHandle<B>> {
        let start = Instant::now();
        let result = self.acquire_internal(TimeoutValue::from(timeout)).await;

        let span = Span::current();
        span.record("elapsed_ms", start.elapsed().as_millis() as u64);
        match result {
            Ok(Some(handle)) => {
                span.record("acquired", true);
                Ok(handle)
            }
            Ok(None) => {
                span.record("acquired", false);
                Err(LockError::Timeout(timeout.unwrap_or_default()))
            }
            Err(e) => {
                span.record("acquired", false);
                Err(e)
            }
        }
    }

    /// Attempts to acquire the lock, waiting up to `timeout`.
    ///
    /// Same as [`acquire`](Self::acquire) except an elapsed wait is reported
    /// as `Ok(None)` rather than an error. `Duration::ZERO` makes a single
    /// attempt.
    #[instrument(
        skip(self),
        fields(lock.name = %self.name, backend = self.backend.kind(), timeout = ?timeout, acquired = Empty)
    )]
    pub async fn try_acquire(&self, timeout: Duration) -> LockResult<Option<LockHandle<B>>> {
        let result = self.acquire_internal(TimeoutValue::from(timeout)).await;
        Span::current().record("acquired", matches!(result, Ok(Some(_))));
        result
    }

    /// Runs `f` while holding the lock.
    ///
    /// The lock is released on every exit path: after `f` completes, and via
    /// the handle's `Drop` if `f` panics or this future is cancelled. If the
    /// release reveals that the session was lost, the output of `f` is
    /// discarded and [`LockError::LockLost`] is returned, since `f` may not
    /// have run exclusively.
    pub async fn run_exclusive<F, Fut, T>(&self, timeout: Timeout, f: F) -> LockResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut handle = self.acquire(timeout).await?;
        let output = f().await;
        handle.release().await?;
        Ok(output)
    }

    /// Opens a session and asks the store for the lock on it.
    ///
    /// Any session that does not end up holding the lock is closed before
    /// returning.
    async fn acquire_internal(&self, timeout: TimeoutValue) -> LockResult<Option<LockHandle<B>>> {
        let mut session = self.backend.open_session().await?;

        let attempt = self.backend.try_acquire(&mut session, &self.key, timeout);
        let outcome = match timeout.as_duration() {
            // The store bounds the wait; this deadline only catches a store that stopped answering.
            Some(wait) => {
                let grace = self.options.store_grace;
                match tokio::time::timeout(wait.saturating_add(grace), attempt).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(LockError::unavailable(format!(
                        "store did not answer within {grace:?} past the {wait:?} wait bound"
                    ))),
                }
            }
            None => attempt.await,
        };

        match outcome {
            Ok(true) => {
                debug!("lock granted");
                Ok(Some(LockHandle::new(
                    self.name.clone(),
                    self.key.clone(),
                    Arc::clone(&self.backend),
                    session,
                    self.options.keepalive_cadence,
                )))
            }
            Ok(false) => {
                self.backend.close_session(session).await;
                Ok(None)
            }
            Err(e) => {
                self.backend.close_session(session).await;
                Err(e)
            }
        }
    }
}

impl<B: LockBackend> Clone for DistributedLock<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            key: self.key.clone(),
            backend: Arc::clone(&self.backend),
            options: self.options,
        }
    }
}

impl<B: LockBackend> fmt::Debug for DistributedLock<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedLock")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("backend", &self.backend.kind())
            .field("options", &self.options)
            .finish()
    }
}
