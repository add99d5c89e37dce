//! Connection pool management for PostgreSQL locks.

use std::fmt;

use advisory_lock_core::error::LockResult;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::map_sqlx_error;

/// PostgreSQL connection source.
#[derive(Clone)]
pub enum PostgresConnection {
    /// Connection string - library manages pooling.
    ConnectionString(String),
    /// External connection pool.
    Pool(PgPool),
}

impl PostgresConnection {
    /// Gets or creates a connection pool.
    ///
    /// `max_connections` caps how many locks can be held at once through a
    /// pool created here; it is ignored for an external pool.
    pub async fn get_pool(&self, max_connections: Option<u32>) -> LockResult<PgPool> {
        match self {
            Self::ConnectionString(url) => {
                let mut options = PgPoolOptions::new();
                if let Some(max) = max_connections {
                    options = options.max_connections(max);
                }
                options.connect(url).await.map_err(map_sqlx_error)
            }
            Self::Pool(pool) => Ok(pool.clone()),
        }
    }
}

impl fmt::Debug for PostgresConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionString(_) => {
                write!(f, "PostgresConnection::ConnectionString([REDACTED])")
            }
            Self::Pool(_) => write!(f, "PostgresConnection::Pool([POOL])"),
        }
    }
}
