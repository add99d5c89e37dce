//! Core types for distributed locks built on a store's session-scoped lock
//! primitive.
//!
//! A [`DistributedLock`] names a mutual-exclusion domain. Acquiring it opens a
//! session on the coordination store and asks the store for the named lock
//! on that session; the returned [`LockHandle`] owns the session. The store
//! drops the lock when the session ends, whether the handle releases it, the
//! process exits, or the connection dies. The store is therefore the only
//! authority on whether a lock is held.
//!
//! Backends implement [`LockBackend`]. [`memory::InMemoryBackend`] is an
//! in-process store for tests and single-host use.
//!
//! # Known hazards
//!
//! - No re-entrancy: acquiring a name the caller already holds waits on itself.
//! - No fairness: the order waiters are granted the lock is up to the store.
//! - If the store becomes unreachable while a lock is held, the store may
//!   reclaim the lock before the holder notices. A keepalive
//!   ([`LockOptions::keepalive_cadence`]) and [`LockHandle::check`] shrink but
//!   do not close that window.

pub mod backend;
pub mod error;
pub mod handle;
pub mod lock;
pub mod memory;
pub mod name;
pub mod options;
pub mod prelude;
pub mod provider;
pub mod timeout;

pub use error::{LockError, LockResult};
pub use prelude::*;
pub use timeout::{Timeout, TimeoutValue};
