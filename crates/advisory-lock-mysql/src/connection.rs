//! MySQL connection management for distributed locks.

use std::fmt;

use advisory_lock_core::error::LockResult;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

use crate::error::map_sqlx_error;

/// Represents different ways to connect to MySQL.
#[derive(Clone)]
pub enum MySqlConnection {
    /// Connect using a connection string.
    ConnectionString(String),
    /// Use an existing connection pool.
    Pool(MySqlPool),
}

impl MySqlConnection {
    /// Get or create a connection pool.
    ///
    /// For ConnectionString variant, creates a new pool.
    /// For Pool variant, clones the existing pool.
    pub async fn get_pool(&self, max_connections: Option<u32>) -> LockResult<MySqlPool> {
        match self {
            MySqlConnection::ConnectionString(url) => {
                let mut options = MySqlPoolOptions::new();
                if let Some(max) = max_connections {
                    options = options.max_connections(max);
                }
                options.connect(url).await.map_err(map_sqlx_error)
            }
            MySqlConnection::Pool(pool) => Ok(pool.clone()),
        }
    }
}

impl fmt::Debug for MySqlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MySqlConnection::ConnectionString(_) => {
                write!(f, "MySqlConnection::ConnectionString([REDACTED])")
            }
            MySqlConnection::Pool(_) => write!(f, "MySqlConnection::Pool([POOL])"),
        }
    }
}
