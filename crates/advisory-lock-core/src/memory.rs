//! In-process coordination store.
//!
//! [`InMemoryBackend`] behaves like a database's session lock table: every
//! acquisition runs on its own session, waits are bounded inside the store,
//! and a session that ends (gracefully or not) gives up everything it holds.
//! It coordinates tasks within one process only, which makes it the store of
//! choice for tests and benches. The failure hooks
//! ([`terminate_holder`](InMemoryBackend::terminate_holder),
//! [`set_available`](InMemoryBackend::set_available)) simulate a store killing
//! a session and a store going away.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::backend::LockBackend;
use crate::error::{LockError, LockResult};
use crate::lock::DistributedLock;
use crate::name::{to_safe_name, validate_name};
use crate::options::LockOptions;
use crate::provider::LockProvider;
use crate::timeout::TimeoutValue;

/// Longest key the store accepts; longer names are hashed.
pub const MAX_KEY_LENGTH: usize = 255;

#[derive(Debug, Default)]
struct StoreState {
    /// key -> id of the session holding it
    holders: HashMap<String, u64>,
    /// sessions the store has killed but whose owners haven't noticed yet
    terminated: HashSet<u64>,
}

#[derive(Debug)]
struct Store {
    state: Mutex<StoreState>,
    released: Notify,
    available: AtomicBool,
    next_session: AtomicU64,
}

impl Store {
    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_usable(&self, session_id: u64, state: &StoreState) -> LockResult<()> {
        if !self.available.load(Ordering::Acquire) {
            return Err(LockError::unavailable("in-memory store is unavailable"));
        }
        if state.terminated.contains(&session_id) {
            return Err(LockError::unavailable(format!(
                "session {session_id} was terminated by the store"
            )));
        }
        Ok(())
    }

    fn try_take(&self, session_id: u64, key: &str) -> LockResult<bool> {
        let mut state = self.state();
        self.ensure_usable(session_id, &state)?;
        match state.holders.get(key) {
            Some(&holder) => Ok(holder == session_id),
            None => {
                state.holders.insert(key.to_string(), session_id);
                Ok(true)
            }
        }
    }

    /// Drops every lock held by `session_id` and wakes waiters.
    fn end_session(&self, session_id: u64) {
        let freed = {
            let mut state = self.state();
            state.terminated.remove(&session_id);
            let before = state.holders.len();
            state.holders.retain(|_, holder| *holder != session_id);
            before - state.holders.len()
        };
        if freed > 0 {
            self.released.notify_waiters();
        }
    }
}

/// A session on the in-memory store. Dropping it ends the session.
#[derive(Debug)]
pub struct InMemorySession {
    id: u64,
    store: Arc<Store>,
}

impl InMemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for InMemorySession {
    fn drop(&mut self) {
        self.store.end_session(self.id);
    }
}

/// Session-lock store living in this process.
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<Store>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Store {
                state: Mutex::new(StoreState::default()),
                released: Notify::new(),
                available: AtomicBool::new(true),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Kills the session currently holding `name`, as a store does when it
    /// detects a dead connection. The lock is freed immediately; the old
    /// holder only finds out on its next use of the session.
    ///
    /// Returns false if nobody holds `name`.
    pub fn terminate_holder(&self, name: &str) -> bool {
        let Ok(key) = self.encode_key(name) else {
            return false;
        };
        let terminated = {
            let mut state = self.store.state();
            match state.holders.get(&key).copied() {
                Some(session_id) => {
                    state.holders.retain(|_, holder| *holder != session_id);
                    state.terminated.insert(session_id);
                    debug!(session_id, lock.name = name, "session terminated");
                    true
                }
                None => false,
            }
        };
        if terminated {
            self.store.released.notify_waiters();
        }
        terminated
    }

    /// Makes the store reachable or unreachable. While unreachable, opening
    /// sessions and every operation on existing sessions fail with
    /// [`LockError::Unavailable`]; locks already granted stay granted.
    /// Waits in flight fail as soon as the store goes away.
    pub fn set_available(&self, available: bool) {
        self.store.available.store(available, Ordering::Release);
        self.store.released.notify_waiters();
    }

    /// Whether some session currently holds `name`.
    pub fn is_held(&self, name: &str) -> bool {
        match self.encode_key(name) {
            Ok(key) => self.store.state().holders.contains_key(&key),
            Err(_) => false,
        }
    }

    /// Number of locks currently held across all sessions.
    pub fn holder_count(&self) -> usize {
        self.store.state().holders.len()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LockBackend for InMemoryBackend {
    type Key = String;
    type Session = InMemorySession;

    fn kind(&self) -> &'static str {
        "memory"
    }

    fn encode_key(&self, name: &str) -> LockResult<String> {
        validate_name(name)?;
        Ok(to_safe_name(name, MAX_KEY_LENGTH, |_| true, str::to_string))
    }

    async fn open_session(&self) -> LockResult<InMemorySession> {
        if !self.store.available.load(Ordering::Acquire) {
            return Err(LockError::unavailable("in-memory store is unavailable"));
        }
        let id = self.store.next_session.fetch_add(1, Ordering::Relaxed);
        Ok(InMemorySession {
            id,
            store: Arc::clone(&self.store),
        })
    }

    async fn try_acquire(
        &self,
        session: &mut InMemorySession,
        key: &String,
        timeout: TimeoutValue,
    ) -> LockResult<bool> {
        let deadline = timeout.deadline_from(Instant::now());

        loop {
            // Register for wakeups before looking, so a release in between isn't missed.
            let notified = self.store.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.store.try_take(session.id, key)? {
                return Ok(true);
            }
            if timeout.is_zero() {
                return Ok(false);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(false);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn release(&self, session: &mut InMemorySession, key: &String) -> LockResult<()> {
        {
            let mut state = self.store.state();
            self.store.ensure_usable(session.id, &state)?;
            if state.holders.get(key) != Some(&session.id) {
                return Err(LockError::LockLost(format!(
                    "'{key}' is not held by session {}",
                    session.id
                )));
            }
            state.holders.remove(key);
        }
        self.store.released.notify_waiters();
        Ok(())
    }

    async fn ping(&self, session: &mut InMemorySession) -> LockResult<()> {
        let state = self.store.state();
        self.store.ensure_usable(session.id, &state)
    }

    async fn close_session(&self, session: InMemorySession) {
        drop(session);
    }
}

/// Provider handing out locks on a shared [`InMemoryBackend`].
#[derive(Clone)]
pub struct InMemoryLockProvider {
    backend: Arc<InMemoryBackend>,
    options: LockOptions,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(InMemoryBackend::new()))
    }

    /// Shares an existing store, e.g. to model several processes.
    pub fn with_backend(backend: Arc<InMemoryBackend>) -> Self {
        Self {
            backend,
            options: LockOptions::default(),
        }
    }

    pub fn options(mut self, options: LockOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend(&self) -> &Arc<InMemoryBackend> {
        &self.backend
    }
}

impl Default for InMemoryLockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LockProvider for InMemoryLockProvider {
    type Backend = InMemoryBackend;

    fn create_lock(&self, name: &str) -> LockResult<DistributedLock<InMemoryBackend>> {
        DistributedLock::with_options(name, Arc::clone(&self.backend), self.options)
    }
}
