//! MySQL backend for distributed locks.
//!
//! Uses MySQL's GET_LOCK and RELEASE_LOCK functions for distributed locking
//! across multiple processes and machines. Named locks belong to the
//! connection that took them and are released by the server when that
//! connection ends.

pub mod backend;
pub mod connection;
mod error;
pub mod name;
pub mod provider;

pub use backend::{MySqlBackend, MySqlSession};
pub use connection::MySqlConnection;
pub use provider::{MySqlLockProvider, MySqlLockProviderBuilder};
