//! MySQL `GET_LOCK` / `RELEASE_LOCK` as a [`LockBackend`].

use advisory_lock_core::backend::LockBackend;
use advisory_lock_core::error::{LockError, LockResult};
use advisory_lock_core::timeout::TimeoutValue;
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlConnection as RawConnection, MySqlPool, Row};
use tracing::{debug, instrument};

use crate::error::map_sqlx_error;
use crate::name::encode_lock_name;

/// One pooled connection dedicated to a single lock.
///
/// The connection returns to the pool only when it is known to hold nothing;
/// otherwise it is closed on drop and the server releases its named locks.
pub struct MySqlSession {
    conn: PoolConnection<MySql>,
    reusable: bool,
}

impl MySqlSession {
    fn connection(&mut self) -> &mut RawConnection {
        &mut self.conn
    }
}

impl Drop for MySqlSession {
    fn drop(&mut self) {
        if !self.reusable {
            self.conn.close_on_drop();
        }
    }
}

/// `GET_LOCK` timeout argument: `-1` waits forever, finite waits are rounded
/// up to whole seconds.
fn get_lock_timeout(timeout: TimeoutValue) -> i64 {
    match timeout.as_secs_ceil() {
        Some(secs) => i64::try_from(secs).unwrap_or(i64::MAX),
        None => -1,
    }
}

/// Named-lock adapter over a MySQL connection pool.
#[derive(Debug, Clone)]
pub struct MySqlBackend {
    pool: MySqlPool,
}

impl MySqlBackend {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

impl LockBackend for MySqlBackend {
    type Key = String;
    type Session = MySqlSession;

    fn kind(&self) -> &'static str {
        "mysql"
    }

    fn encode_key(&self, name: &str) -> LockResult<String> {
        encode_lock_name(name)
    }

    async fn open_session(&self) -> LockResult<MySqlSession> {
        let conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        debug!("mysql session opened");
        Ok(MySqlSession {
            conn,
            reusable: true,
        })
    }

    #[instrument(skip(self, session))]
    async fn try_acquire(
        &self,
        session: &mut MySqlSession,
        key: &String,
        timeout: TimeoutValue,
    ) -> LockResult<bool> {
        session.reusable = false;
        let row = sqlx::query("SELECT GET_LOCK(?, ?)")
            .bind(key)
            .bind(get_lock_timeout(timeout))
            .fetch_one(session.connection())
            .await
            .map_err(map_sqlx_error)?;

        let result: Option<i64> = row.try_get(0).map_err(LockError::backend)?;
        match result {
            Some(1) => Ok(true),
            Some(0) => {
                session.reusable = true;
                Ok(false)
            }
            other => Err(LockError::backend(format!(
                "unexpected GET_LOCK result: {other:?}"
            ))),
        }
    }

    async fn release(&self, session: &mut MySqlSession, key: &String) -> LockResult<()> {
        let row = sqlx::query("SELECT RELEASE_LOCK(?)")
            .bind(key)
            .fetch_one(session.connection())
            .await
            .map_err(map_sqlx_error)?;

        let result: Option<i64> = row.try_get(0).map_err(LockError::backend)?;
        match result {
            Some(1) => {
                session.reusable = true;
                Ok(())
            }
            Some(_) => Err(LockError::LockLost(format!(
                "named lock '{key}' is held by another connection"
            ))),
            None => Err(LockError::LockLost(format!(
                "named lock '{key}' does not exist"
            ))),
        }
    }

    async fn ping(&self, session: &mut MySqlSession) -> LockResult<()> {
        sqlx::query("SELECT 1")
            .execute(session.connection())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn close_session(&self, session: MySqlSession) {
        drop(session);
        debug!("mysql session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_get_lock_timeout() {
        assert_eq!(get_lock_timeout(TimeoutValue::INFINITE), -1);
        assert_eq!(get_lock_timeout(TimeoutValue::ZERO), 0);
        assert_eq!(get_lock_timeout(Duration::from_millis(1200).into()), 2);
        assert_eq!(get_lock_timeout(Duration::from_secs(10).into()), 10);
    }
}
