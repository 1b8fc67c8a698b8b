//! Map Key Hashing
//!
//! Map indexes address records by caller-supplied strings, but pages are
//! partitioned over the `u64` key space. A string of ASCII digits that fits
//! in a `u64` maps to itself; anything else is hashed with xxh64. Leading
//! zeros are accepted, so `"007"` and `"7"` address the same record.
//!
//! The resulting ordering is hash order, not string order. Page ids derive
//! from it, so it must stay stable across releases: changing the seed or the
//! algorithm orphans every existing map page.

use xxhash_rust::xxh64::xxh64;

use crate::error::{PageKvError, Result};

/// Longest accepted string key, in bytes
pub const MAX_KEY_LEN: usize = 255;

/// Characters reserved by the selector syntax and the object record format
const FORBIDDEN: &[char] = &['[', ']', ',', ':'];

const SEED: u64 = 0;

/// Validate `raw` and map it into the u64 key space
pub fn hash_key(raw: &str) -> Result<u64> {
    validate(raw)?;
    // Only plain digit strings are literal ids; "+5" is hashed like any text
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(literal) = raw.parse::<u64>() {
            return Ok(literal);
        }
    }
    Ok(xxh64(raw.as_bytes(), SEED))
}

fn validate(raw: &str) -> Result<()> {
    if raw.is_empty() {
        return Err(PageKvError::InvalidKey("empty key".to_string()));
    }
    if raw.len() > MAX_KEY_LEN {
        return Err(PageKvError::InvalidKey(format!(
            "key is {} bytes, limit is {}",
            raw.len(),
            MAX_KEY_LEN
        )));
    }
    if let Some(c) = raw
        .chars()
        .find(|c| c.is_control() || FORBIDDEN.contains(c))
    {
        return Err(PageKvError::InvalidKey(format!(
            "key {:?} contains forbidden character {:?}",
            raw, c
        )));
    }
    Ok(())
}
