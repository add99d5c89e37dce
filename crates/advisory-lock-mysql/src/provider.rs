//! MySQL lock provider implementation.

use std::sync::Arc;
use std::time::Duration;

use advisory_lock_core::error::{LockError, LockResult};
use advisory_lock_core::lock::DistributedLock;
use advisory_lock_core::options::LockOptions;
use advisory_lock_core::provider::LockProvider;

use crate::backend::MySqlBackend;
use crate::connection::MySqlConnection;

/// Builder for MySQL lock provider configuration.
#[derive(Debug)]
pub struct MySqlLockProviderBuilder {
    connection: Option<MySqlConnection>,
    max_connections: Option<u32>,
    options: LockOptions,
}

impl MySqlLockProviderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            connection: None,
            max_connections: None,
            options: LockOptions::default(),
        }
    }

    /// Sets the MySQL connection string.
    pub fn connection_string(mut self, conn_str: impl Into<String>) -> Self {
        self.connection = Some(MySqlConnection::ConnectionString(conn_str.into()));
        self
    }

    /// Sets an existing connection pool.
    pub fn pool(mut self, pool: sqlx::MySqlPool) -> Self {
        self.connection = Some(MySqlConnection::Pool(pool));
        self
    }

    /// Caps the pool created from a connection string.
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// Sets the keepalive cadence for long-held locks.
    ///
    /// MySQL's `wait_timeout` system variable determines how long the server
    /// will allow a connection to be idle before killing it. This option sets
    /// the cadence at which we run a no-op "keepalive" query on a connection
    /// that is holding a lock.
    pub fn keepalive_cadence(mut self, cadence: Duration) -> Self {
        self.options = self.options.keepalive_cadence(cadence);
        self
    }

    /// Sets how long past a wait bound the client waits for the server to answer.
    ///
    /// `GET_LOCK` waits whole seconds, so keep this above one second.
    pub fn store_grace(mut self, grace: Duration) -> Self {
        self.options = self.options.store_grace(grace);
        self
    }

    /// Builds the provider.
    pub async fn build(self) -> LockResult<MySqlLockProvider> {
        let connection = self
            .connection
            .ok_or_else(|| LockError::Config("connection not specified".to_string()))?;

        let pool = connection.get_pool(self.max_connections).await?;

        Ok(MySqlLockProvider {
            backend: Arc::new(MySqlBackend::new(pool)),
            options: self.options,
        })
    }
}

impl Default for MySqlLockProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider for MySQL-based distributed locks.
#[derive(Debug, Clone)]
pub struct MySqlLockProvider {
    backend: Arc<MySqlBackend>,
    options: LockOptions,
}

impl MySqlLockProvider {
    /// Returns a new builder for configuring the provider.
    pub fn builder() -> MySqlLockProviderBuilder {
        MySqlLockProviderBuilder::new()
    }

    /// Creates a provider using the specified connection string.
    pub async fn new(connection_string: impl Into<String>) -> LockResult<Self> {
        Self::builder()
            .connection_string(connection_string)
            .build()
            .await
    }

    pub fn backend(&self) -> &Arc<MySqlBackend> {
        &self.backend
    }
}

impl LockProvider for MySqlLockProvider {
    type Backend = MySqlBackend;

    fn create_lock(&self, name: &str) -> LockResult<DistributedLock<MySqlBackend>> {
        DistributedLock::with_options(name, Arc::clone(&self.backend), self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_requires_connection() {
        let err = MySqlLockProvider::builder().build().await.unwrap_err();
        assert!(matches!(err, LockError::Config(_)));
    }
}
