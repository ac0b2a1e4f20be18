//! Cache key validation and derivation

use crate::error::{CacheError, Result};
use sha2::{Digest, Sha256};

pub const MAX_KEY_LEN: usize = 120;

/// Returns true if `key` is 1–120 ASCII letters, digits, `_` or `-`.
///
/// Keys become file names inside the cache directory, so anything that could
/// form a path separator or whitespace is rejected.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(CacheError::InvalidKey(key.to_string()))
    }
}

/// Derive a valid cache key from arbitrary text (URLs, composite ids, ...)
pub fn hashed_key(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
