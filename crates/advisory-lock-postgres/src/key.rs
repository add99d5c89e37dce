//! PostgreSQL advisory lock key encoding.

use advisory_lock_core::error::{LockError, LockResult};
use sha2::{Digest, Sha256};

/// Key for PostgreSQL advisory locks.
///
/// Advisory locks use either a single 64-bit key or a pair of 32-bit keys.
/// These represent different key spaces and do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostgresAdvisoryLockKey {
    /// Single 64-bit key.
    Single(i64),
    /// Pair of 32-bit keys.
    Pair(i32, i32),
}

impl PostgresAdvisoryLockKey {
    /// Maximum length for ASCII encoding (9 characters).
    const MAX_ASCII_LENGTH: usize = 9;
    /// Bits per ASCII character (7 bits).
    const ASCII_CHAR_BITS: u32 = 7;
    /// Maximum ASCII value (127).
    const MAX_ASCII_VALUE: u32 = (1 << Self::ASCII_CHAR_BITS) - 1;
    /// Hash string length (16 hex chars for i64).
    const HASH_STRING_LENGTH: usize = 16;
    /// Hash part length (8 hex chars for i32).
    const HASH_PART_LENGTH: usize = 8;
    const HASH_STRING_SEPARATOR: char = ',';

    /// Create a key from a string name.
    ///
    /// - ASCII strings up to 9 chars are encoded directly (collision-free)
    /// - 16-char hex strings are parsed as i64
    /// - "XXXXXXXX,XXXXXXXX" format parsed as (i32, i32)
    /// - Other strings are hashed to i64 (if `allow_hashing` is true)
    pub fn from_name(name: &str, allow_hashing: bool) -> LockResult<Self> {
        if name.is_empty() {
            return Err(LockError::InvalidName(
                "lock name cannot be empty".to_string(),
            ));
        }

        if let Some(key) = Self::try_encode_ascii(name) {
            return Ok(Self::Single(key));
        }
        if let Some(key) = Self::try_parse_hex_string(name) {
            return Ok(key);
        }
        if let Some(key) = Self::try_parse_pair_string(name) {
            return Ok(key);
        }

        if allow_hashing {
            return Ok(Self::Single(Self::hash_string(name)));
        }

        Err(LockError::InvalidName(format!(
            "name '{}' could not be encoded as a PostgresAdvisoryLockKey; enable hashing or use (1) a 0-{} character ASCII string, (2) a {} character hex string, or (3) a {} character string of the form XXXXXXXX{}XXXXXXXX",
            name,
            Self::MAX_ASCII_LENGTH,
            Self::HASH_STRING_LENGTH,
            Self::HASH_PART_LENGTH * 2 + 1,
            Self::HASH_STRING_SEPARATOR
        )))
    }

    /// Try to encode as ASCII string (up to 9 chars).
    fn try_encode_ascii(name: &str) -> Option<i64> {
        if name.len() > Self::MAX_ASCII_LENGTH {
            return None;
        }

        let mut result = 0i64;
        for ch in name.chars() {
            let ch_val = ch as u32;
            if ch_val > Self::MAX_ASCII_VALUE {
                return None;
            }
            result = (result << Self::ASCII_CHAR_BITS) | (ch_val as i64);
        }

        // A zero bit marks the end of the name, remaining slots are filled with ones
        result <<= 1;
        for _ in name.len()..Self::MAX_ASCII_LENGTH {
            result = (result << Self::ASCII_CHAR_BITS) | (Self::MAX_ASCII_VALUE as i64);
        }

        Some(result)
    }

    /// Try to parse as hex string (16 chars for i64).
    fn try_parse_hex_string(name: &str) -> Option<Self> {
        if name.len() != Self::HASH_STRING_LENGTH {
            return None;
        }
        u64::from_str_radix(name, 16)
            .ok()
            .map(|bits| Self::Single(bits as i64))
    }

    /// Try to parse as pair format "XXXXXXXX,XXXXXXXX".
    fn try_parse_pair_string(name: &str) -> Option<Self> {
        let (first, second) = name.split_once(Self::HASH_STRING_SEPARATOR)?;
        if first.len() != Self::HASH_PART_LENGTH || second.len() != Self::HASH_PART_LENGTH {
            return None;
        }

        let key1 = u32::from_str_radix(first, 16).ok()? as i32;
        let key2 = u32::from_str_radix(second, 16).ok()? as i32;
        Some(Self::Pair(key1, key2))
    }

    /// Hash a string to i64 using SHA-256 (first 8 bytes, little-endian).
    fn hash_string(name: &str) -> i64 {
        let hash_bytes = Sha256::digest(name.as_bytes());
        let mut first = [0u8; 8];
        first.copy_from_slice(&hash_bytes[..8]);
        i64::from_le_bytes(first)
    }

    /// SQL calling `function` with this key as bind parameters.
    pub(crate) fn call_sql(&self, function: &str) -> String {
        match self {
            Self::Single(_) => format!("SELECT {function}($1)"),
            Self::Pair(_, _) => format!("SELECT {function}($1, $2)"),
        }
    }
}
