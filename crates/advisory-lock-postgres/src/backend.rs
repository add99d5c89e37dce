//! PostgreSQL advisory locks as a [`LockBackend`].

use advisory_lock_core::backend::LockBackend;
use advisory_lock_core::error::{LockError, LockResult};
use advisory_lock_core::timeout::TimeoutValue;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{Connection, PgConnection, PgPool, Postgres, Row};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::error::{is_lock_timeout, map_sqlx_error};
use crate::key::PostgresAdvisoryLockKey;

/// What the advisory lock is tied to on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostgresLockScope {
    /// `pg_advisory_lock`: held until unlocked or the connection ends.
    #[default]
    Session,
    /// `pg_advisory_xact_lock`: a transaction stays open while the lock is
    /// held and is rolled back on release.
    Transaction,
}

/// One pooled connection dedicated to a single lock.
///
/// A connection only goes back to the pool when it is known to hold nothing:
/// after a clean release or a clean refusal. In every other case (a wait that
/// was abandoned half-way, an error, a lock still held) it is closed on drop,
/// which makes the server end the backend and drop its locks and waits.
pub struct PostgresSession {
    conn: PoolConnection<Postgres>,
    reusable: bool,
}

impl PostgresSession {
    fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        if !self.reusable {
            self.conn.close_on_drop();
        }
    }
}

fn key_query<'q>(sql: &'q str, key: &PostgresAdvisoryLockKey) -> Query<'q, Postgres, PgArguments> {
    let query = sqlx::query(sql);
    match *key {
        PostgresAdvisoryLockKey::Single(k) => query.bind(k),
        PostgresAdvisoryLockKey::Pair(k1, k2) => query.bind(k1).bind(k2),
    }
}

/// Largest `lock_timeout` the server accepts, in milliseconds.
const MAX_LOCK_TIMEOUT_MS: u64 = i32::MAX as u64;

/// Value for the `lock_timeout` setting; `0` disables it. Finite waits are
/// clamped to what the server accepts.
fn lock_timeout_setting(timeout: TimeoutValue) -> String {
    match timeout.as_millis_ceil() {
        Some(ms) => format!("{}ms", ms.clamp(1, MAX_LOCK_TIMEOUT_MS)),
        None => "0".to_string(),
    }
}

/// Wait bound for the next round of a wait ending at `deadline`, or `None`
/// once the deadline has passed. A wait longer than `lock_timeout` allows
/// runs as several rounds.
fn next_round(deadline: Option<Instant>) -> Option<TimeoutValue> {
    match deadline {
        None => Some(TimeoutValue::INFINITE),
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            (!left.is_zero()).then(|| TimeoutValue::from(left))
        }
    }
}

/// Advisory-lock adapter over a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    pool: PgPool,
    scope: PostgresLockScope,
    allow_hashing: bool,
}

impl PostgresBackend {
    pub fn new(pool: PgPool, scope: PostgresLockScope, allow_hashing: bool) -> Self {
        Self {
            pool,
            scope,
            allow_hashing,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn scope(&self) -> PostgresLockScope {
        self.scope
    }

    async fn try_lock_once(
        conn: &mut PgConnection,
        function: &str,
        key: &PostgresAdvisoryLockKey,
    ) -> LockResult<bool> {
        let sql = key.call_sql(function);
        let row = key_query(&sql, key)
            .fetch_one(conn)
            .await
            .map_err(map_sqlx_error)?;
        row.try_get::<bool, _>(0).map_err(LockError::backend)
    }

    /// Session scope: a zero timeout is a single `pg_try_advisory_lock`.
    /// Otherwise each round runs the blocking call in a short transaction so
    /// that `lock_timeout` can be set locally; the session-level lock survives
    /// the commit.
    async fn acquire_session_lock(
        conn: &mut PgConnection,
        key: &PostgresAdvisoryLockKey,
        timeout: TimeoutValue,
    ) -> LockResult<bool> {
        if timeout.is_zero() {
            return Self::try_lock_once(conn, "pg_try_advisory_lock", key).await;
        }

        let deadline = timeout.deadline_from(Instant::now());
        let sql = key.call_sql("pg_advisory_lock");
        while let Some(round) = next_round(deadline) {
            let mut tx = conn.begin().await.map_err(map_sqlx_error)?;
            sqlx::query("SELECT set_config('lock_timeout', $1, true)")
                .bind(lock_timeout_setting(round))
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            match key_query(&sql, key).execute(&mut *tx).await {
                Ok(_) => {
                    tx.commit().await.map_err(map_sqlx_error)?;
                    return Ok(true);
                }
                Err(e) if is_lock_timeout(&e) => {
                    tx.rollback().await.map_err(map_sqlx_error)?;
                }
                Err(e) => return Err(map_sqlx_error(e)),
            }
        }
        Ok(false)
    }

    /// Transaction scope: opens a transaction that stays open while the lock
    /// is held. A refused or timed-out round rolls it back.
    async fn acquire_transaction_lock(
        conn: &mut PgConnection,
        key: &PostgresAdvisoryLockKey,
        timeout: TimeoutValue,
    ) -> LockResult<bool> {
        if timeout.is_zero() {
            Self::execute(conn, "BEGIN").await?;
            let acquired = Self::try_lock_once(conn, "pg_try_advisory_xact_lock", key).await?;
            if !acquired {
                Self::execute(conn, "ROLLBACK").await?;
            }
            return Ok(acquired);
        }

        let deadline = timeout.deadline_from(Instant::now());
        let sql = key.call_sql("pg_advisory_xact_lock");
        while let Some(round) = next_round(deadline) {
            Self::execute(conn, "BEGIN").await?;
            sqlx::query("SELECT set_config('lock_timeout', $1, true)")
                .bind(lock_timeout_setting(round))
                .execute(&mut *conn)
                .await
                .map_err(map_sqlx_error)?;

            match key_query(&sql, key).execute(&mut *conn).await {
                Ok(_) => return Ok(true),
                Err(e) if is_lock_timeout(&e) => Self::execute(conn, "ROLLBACK").await?,
                Err(e) => return Err(map_sqlx_error(e)),
            }
        }
        Ok(false)
    }

    async fn execute(conn: &mut PgConnection, sql: &str) -> LockResult<()> {
        sqlx::query(sql)
            .execute(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

impl LockBackend for PostgresBackend {
    type Key = PostgresAdvisoryLockKey;
    type Session = PostgresSession;

    fn kind(&self) -> &'static str {
        "postgres"
    }

    fn encode_key(&self, name: &str) -> LockResult<PostgresAdvisoryLockKey> {
        PostgresAdvisoryLockKey::from_name(name, self.allow_hashing)
    }

    async fn open_session(&self) -> LockResult<PostgresSession> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        debug!("postgres session opened");
        Ok(PostgresSession {
            conn,
            reusable: true,
        })
    }

    #[instrument(skip(self, session), fields(scope = ?self.scope))]
    async fn try_acquire(
        &self,
        session: &mut PostgresSession,
        key: &PostgresAdvisoryLockKey,
        timeout: TimeoutValue,
    ) -> LockResult<bool> {
        // Stays false if this future is dropped or fails mid-way.
        session.reusable = false;
        let conn = session.connection();
        let acquired = match self.scope {
            PostgresLockScope::Session => Self::acquire_session_lock(conn, key, timeout).await?,
            PostgresLockScope::Transaction => {
                Self::acquire_transaction_lock(conn, key, timeout).await?
            }
        };
        session.reusable = !acquired;
        Ok(acquired)
    }

    async fn release(
        &self,
        session: &mut PostgresSession,
        key: &PostgresAdvisoryLockKey,
    ) -> LockResult<()> {
        let conn = session.connection();
        match self.scope {
            PostgresLockScope::Session => {
                let released = Self::try_lock_once(conn, "pg_advisory_unlock", key).await?;
                if !released {
                    return Err(LockError::LockLost(format!(
                        "advisory lock {key:?} was not held by this session"
                    )));
                }
            }
            PostgresLockScope::Transaction => Self::execute(conn, "ROLLBACK").await?,
        }
        session.reusable = true;
        Ok(())
    }

    async fn ping(&self, session: &mut PostgresSession) -> LockResult<()> {
        sqlx::query("SELECT 1")
            .execute(session.connection())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn close_session(&self, session: PostgresSession) {
        drop(session);
        debug!("postgres session closed");
    }
}
