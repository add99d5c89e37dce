//! PostgreSQL backend for distributed locks.
//!
//! Uses PostgreSQL advisory locks. Each held lock pins one pooled connection;
//! the server drops the lock when that connection ends, so a crashed or
//! partitioned holder loses the lock once the server notices the dead
//! connection.

pub mod backend;
pub mod connection;
mod error;
pub mod key;
pub mod provider;

pub use backend::{PostgresBackend, PostgresLockScope, PostgresSession};
pub use connection::PostgresConnection;
pub use key::PostgresAdvisoryLockKey;
pub use provider::{PostgresLockProvider, PostgresLockProviderBuilder};
