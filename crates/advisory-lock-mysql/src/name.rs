//! MySQL lock name encoding.
//!
//! MySQL lock names are compared case-insensitively and are limited to 64
//! characters. Names containing uppercase letters or exceeding the limit are
//! lowercased and suffixed with a hash of the original name, so that `Job`
//! and `job` remain distinct locks.

use advisory_lock_core::error::LockResult;
use advisory_lock_core::name::{to_safe_name, validate_name};

/// Maximum length for MySQL lock names.
pub const MAX_NAME_LENGTH: usize = 64;

/// Encodes a lock name to be safe for MySQL `GET_LOCK`.
pub fn encode_lock_name(name: &str) -> LockResult<String> {
    validate_name(name)?;
    Ok(to_safe_name(
        name,
        MAX_NAME_LENGTH,
        |n| !n.chars().any(char::is_uppercase),
        str::to_lowercase,
    ))
}
