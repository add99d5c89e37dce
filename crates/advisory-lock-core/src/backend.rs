//! The session-scoped lock primitive every coordination store exposes.

use std::fmt::Debug;
use std::future::Future;

use crate::error::LockResult;
use crate::timeout::TimeoutValue;

/// Adapter over a coordination store's native "named lock tied to this
/// session" primitive.
///
/// A backend needs three capabilities from its store: a session concept, a
/// named lock that can be acquired with a bounded wait and released, and
/// automatic release of everything a session holds when the session ends,
/// including ungraceful ends. The store, not this process, is the authority on
/// whether a lock is still held.
///
/// Sessions are owned by exactly one [`LockHandle`](crate::LockHandle) and are
/// never used concurrently.
pub trait LockBackend: Send + Sync + 'static {
    /// Store-specific coordination key derived from a lock name.
    type Key: Clone + Debug + Send + Sync + 'static;

    /// One live connection to the store.
    type Session: Send + 'static;

    /// Short label for tracing fields, e.g. `"postgres"`.
    fn kind(&self) -> &'static str;

    /// Validates a lock name and maps it to a key. Must be deterministic.
    fn encode_key(&self, name: &str) -> LockResult<Self::Key>;

    /// Opens a new session.
    ///
    /// Fails with [`LockError::Unavailable`](crate::LockError::Unavailable)
    /// when the store cannot be reached.
    fn open_session(&self) -> impl Future<Output = LockResult<Self::Session>> + Send;

    /// Attempts to take `key` on `session`, letting the store wait up to
    /// `timeout`.
    ///
    /// Returns `Ok(false)` when the wait bound elapses. The wait must be
    /// bounded at the store; dropping the returned future must not leave a
    /// waiter behind once the session is closed.
    fn try_acquire(
        &self,
        session: &mut Self::Session,
        key: &Self::Key,
        timeout: TimeoutValue,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Releases `key` on `session`.
    fn release(
        &self,
        session: &mut Self::Session,
        key: &Self::Key,
    ) -> impl Future<Output = LockResult<()>> + Send;

    /// Probes the session. An error means the session is dead and every lock
    /// it held is gone.
    fn ping(&self, session: &mut Self::Session) -> impl Future<Output = LockResult<()>> + Send;

    /// Ends the session. The store drops whatever the session still holds.
    fn close_session(&self, session: Self::Session) -> impl Future<Output = ()> + Send;
}
