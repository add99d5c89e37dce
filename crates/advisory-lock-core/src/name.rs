//! Lock name validation and normalization.
//!
//! Store-side named locks cap the length (and sometimes the alphabet) of lock
//! names. Names that don't fit are mapped to a fixed-width form: as much of the
//! converted name as fits, followed by a Base32 digest of the original name.
//! The mapping is deterministic, so every process derives the same key.

use sha2::{Digest, Sha512};

use crate::error::{LockError, LockResult};

/// Length of the digest produced by [`compute_hash`] (160 bits / 5 bits per char).
pub const HASH_LENGTH_IN_CHARS: usize = 32;

const BASE32_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Rejects names that can never identify a lock.
pub fn validate_name(name: &str) -> LockResult<()> {
    if name.is_empty() {
        return Err(LockError::InvalidName(
            "lock name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Computes a lowercase Base32 digest of the input bytes.
///
/// SHA-512 truncated to 160 bits.
pub fn compute_hash(bytes: &[u8]) -> String {
    let hash_bytes = Sha512::digest(bytes);

    let mut out = String::with_capacity(HASH_LENGTH_IN_CHARS);
    let mut byte_index = 0;
    let mut bit_buffer = 0u32;
    let mut bits_remaining = 0;

    for _ in 0..HASH_LENGTH_IN_CHARS {
        if bits_remaining < 5 {
            bit_buffer |= (hash_bytes[byte_index] as u32) << bits_remaining;
            bits_remaining += 8;
            byte_index += 1;
        }

        out.push(BASE32_ALPHABET[(bit_buffer & 31) as usize] as char);
        bit_buffer >>= 5;
        bits_remaining -= 5;
    }

    out
}

/// Maps `name` to a form no longer than `max_name_length` bytes.
///
/// Names accepted by `is_valid` that already fit are returned unchanged.
/// Anything else becomes `prefix + hash`, where the prefix is taken from
/// `convert(name)`.
pub fn to_safe_name(
    name: &str,
    max_name_length: usize,
    is_valid: impl Fn(&str) -> bool,
    convert: impl Fn(&str) -> String,
) -> String {
    if name.len() <= max_name_length && is_valid(name) {
        return name.to_string();
    }

    let name_hash = compute_hash(name.as_bytes());
    if name_hash.len() >= max_name_length {
        return name_hash[..max_name_length].to_string();
    }

    let budget = max_name_length - name_hash.len();
    let mut prefix = String::with_capacity(budget);
    for ch in convert(name).chars() {
        if prefix.len() + ch.len_utf8() > budget {
            break;
        }
        prefix.push(ch);
    }
    prefix + &name_hash
}
