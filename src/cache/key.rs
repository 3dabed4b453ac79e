//! Cache key derivation.
//!
//! Two strategies are available:
//! - `Sanitize` replaces `/` and `:` with `-`. Readable, but lossy: targets
//!   that differ only in those characters share a key.
//! - `Hashed` appends a SHA-256 of the full target to a bounded sanitized
//!   prefix, so keys stay readable in a directory listing but never collide.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Characters replaced by [`sanitize`].
const UNSAFE_CHARS: [char; 2] = ['/', ':'];

/// Substitute for every unsafe character.
const SUBSTITUTE: char = '-';

/// Upper bound on the readable prefix of a hashed key, in bytes.
const HASHED_PREFIX_MAX: usize = 64;

/// Filesystem-safe identifier for one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Replace path separators and scheme delimiters with `-`.
///
/// Total over all strings; no length limit is applied.
pub fn sanitize(target: &str) -> CacheKey {
    let key = target
        .chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { SUBSTITUTE } else { c })
        .collect();
    CacheKey(key)
}

/// Sanitized prefix (at most 64 bytes) joined to the hex SHA-256 of `target`.
pub fn hashed(target: &str) -> CacheKey {
    let mut prefix = sanitize(target).0;
    if prefix.len() > HASHED_PREFIX_MAX {
        let mut end = HASHED_PREFIX_MAX;
        while !prefix.is_char_boundary(end) {
            end -= 1;
        }
        prefix.truncate(end);
    }
    let digest = hex::encode(Sha256::digest(target.as_bytes()));
    CacheKey(format!("{prefix}{SUBSTITUTE}{digest}"))
}

/// How request targets map to cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Plain character substitution; compatible with caches written by older proxies.
    Sanitize,
    /// Collision-resistant hashed key.
    #[default]
    Hashed,
}

impl KeyStrategy {
    pub fn derive(&self, target: &str) -> CacheKey {
        match self {
            KeyStrategy::Sanitize => sanitize(target),
            KeyStrategy::Hashed => hashed(target),
        }
    }
}
