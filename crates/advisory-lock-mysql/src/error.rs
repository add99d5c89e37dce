//! Mapping of driver errors onto the lock error taxonomy.

use advisory_lock_core::error::LockError;
use sqlx::mysql::MySqlDatabaseError;

/// `ER_USER_LOCK_DEADLOCK`: waiting for the lock would deadlock with another session.
const ER_USER_LOCK_DEADLOCK: u16 = 3058;
/// `ER_QUERY_INTERRUPTED`: the statement was killed.
const ER_QUERY_INTERRUPTED: u16 = 1317;
/// `ER_SERVER_SHUTDOWN`
const ER_SERVER_SHUTDOWN: u16 = 1053;

fn error_number(err: &sqlx::Error) -> Option<u16> {
    err.as_database_error()
        .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
        .map(MySqlDatabaseError::number)
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> LockError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => LockError::unavailable(err),
        sqlx::Error::Configuration(_) => LockError::Config(err.to_string()),
        _ => match error_number(&err) {
            Some(ER_USER_LOCK_DEADLOCK) => LockError::Deadlock(err.to_string()),
            Some(ER_QUERY_INTERRUPTED | ER_SERVER_SHUTDOWN) => LockError::unavailable(err),
            _ => LockError::backend(err),
        },
    }
}
