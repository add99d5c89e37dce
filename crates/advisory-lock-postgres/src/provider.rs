//! PostgreSQL lock provider implementation.

use std::sync::Arc;
use std::time::Duration;

use advisory_lock_core::error::{LockError, LockResult};
use advisory_lock_core::lock::DistributedLock;
use advisory_lock_core::options::LockOptions;
use advisory_lock_core::provider::LockProvider;
use sqlx::PgPool;

use crate::backend::{PostgresBackend, PostgresLockScope};
use crate::connection::PostgresConnection;

/// Builder for PostgreSQL lock provider configuration.
#[derive(Debug)]
pub struct PostgresLockProviderBuilder {
    connection: Option<PostgresConnection>,
    scope: PostgresLockScope,
    allow_hashing: bool,
    max_connections: Option<u32>,
    options: LockOptions,
}

impl PostgresLockProviderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            connection: None,
            scope: PostgresLockScope::default(),
            allow_hashing: true,
            max_connections: None,
            options: LockOptions::default(),
        }
    }

    /// Sets the PostgreSQL connection string.
    pub fn connection_string(mut self, conn_str: impl Into<String>) -> Self {
        self.connection = Some(PostgresConnection::ConnectionString(conn_str.into()));
        self
    }

    /// Sets an existing connection pool.
    ///
    /// Every held lock occupies one connection of the pool for as long as it
    /// is held.
    pub fn pool(mut self, pool: PgPool) -> Self {
        self.connection = Some(PostgresConnection::Pool(pool));
        self
    }

    /// Sets what the advisory lock is tied to on the server.
    pub fn scope(mut self, scope: PostgresLockScope) -> Self {
        self.scope = scope;
        self
    }

    /// Whether names that don't fit a key format are hashed (default) or rejected.
    pub fn allow_hashing(mut self, allow_hashing: bool) -> Self {
        self.allow_hashing = allow_hashing;
        self
    }

    /// Caps the pool created from a connection string.
    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = Some(max_connections);
        self
    }

    /// Sets the cadence of the liveness query run on connections holding a lock.
    pub fn keepalive_cadence(mut self, cadence: Duration) -> Self {
        self.options = self.options.keepalive_cadence(cadence);
        self
    }

    /// Sets how long past a wait bound the client waits for the server to answer.
    pub fn store_grace(mut self, grace: Duration) -> Self {
        self.options = self.options.store_grace(grace);
        self
    }

    /// Builds the provider.
    pub async fn build(self) -> LockResult<PostgresLockProvider> {
        let connection = self
            .connection
            .ok_or_else(|| LockError::Config("connection not specified".to_string()))?;

        let pool = connection.get_pool(self.max_connections).await?;

        Ok(PostgresLockProvider {
            backend: Arc::new(PostgresBackend::new(pool, self.scope, self.allow_hashing)),
            options: self.options,
        })
    }
}

impl Default for PostgresLockProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider for PostgreSQL-based distributed locks.
#[derive(Debug, Clone)]
pub struct PostgresLockProvider {
    backend: Arc<PostgresBackend>,
    options: LockOptions,
}

impl PostgresLockProvider {
    /// Returns a new builder for configuring the provider.
    pub fn builder() -> PostgresLockProviderBuilder {
        PostgresLockProviderBuilder::new()
    }

    /// Creates a provider using the specified connection string.
    pub async fn new(connection_string: impl Into<String>) -> LockResult<Self> {
        Self::builder()
            .connection_string(connection_string)
            .build()
            .await
    }

    pub fn backend(&self) -> &Arc<PostgresBackend> {
        &self.backend
    }
}

impl LockProvider for PostgresLockProvider {
    type Backend = PostgresBackend;

    fn create_lock(&self, name: &str) -> LockResult<DistributedLock<PostgresBackend>> {
        DistributedLock::with_options(name, Arc::clone(&self.backend), self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_requires_connection() {
        let err = PostgresLockProvider::builder().build().await.unwrap_err();
        assert!(matches!(err, LockError::Config(_)));
    }

    #[test]
    fn test_connection_string_is_redacted() {
        let builder =
            PostgresLockProvider::builder().connection_string("postgresql://u:secret@db/app");
        let debug = format!("{builder:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }
}
