//! Mapping of driver errors onto the lock error taxonomy.

use advisory_lock_core::error::LockError;

/// SQLSTATE raised when `lock_timeout` expires.
pub(crate) const LOCK_NOT_AVAILABLE: &str = "55P03";

/// SQLSTATE class for server shutdown and connection refusal.
const OPERATOR_INTERVENTION_CLASS: &str = "57P";

pub(crate) fn is_lock_timeout(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(LOCK_NOT_AVAILABLE)
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

/// Transport and pool failures mean the store is unreachable; database errors
/// are reported as backend errors unless the server is going away.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> LockError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => LockError::unavailable(err),
        sqlx::Error::Configuration(_) => LockError::Config(err.to_string()),
        _ if sqlstate(&err).is_some_and(|code| code.starts_with(OPERATOR_INTERVENTION_CLASS)) => {
            LockError::unavailable(err)
        }
        _ => LockError::backend(err),
    }
}
