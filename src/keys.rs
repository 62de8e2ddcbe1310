//! Key hashing strategies for cache and tag keys.
//!
//! Every user-supplied cache key is stored under `"k:" + hasher(key)` and
//! every tag under `"t:" + hasher(tag)`. The hasher is pluggable so that
//! stores with key-length or charset limits (memcached caps keys at 250
//! bytes) can be fed fixed-width keys instead of raw application strings.

use std::fmt::Debug;
use xxhash_rust::xxh64::xxh64;

/// Maps a raw key or tag string to the form stored in the backend.
///
/// Implementations must be pure: the same input must produce the same output
/// for the lifetime of the data in the store, across processes and restarts.
pub trait KeyHasher: Send + Sync + Debug {
    /// Hash a raw key or tag string.
    fn hash(&self, raw: &str) -> String;
}

/// Passes keys through unchanged. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityHasher;

impl KeyHasher for IdentityHasher {
    fn hash(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// Hashes keys to 16 lowercase hex chars with XXH64.
///
/// Useful when application keys can exceed the backing store's key limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xxh64Hasher;

impl KeyHasher for Xxh64Hasher {
    fn hash(&self, raw: &str) -> String {
        format!("{:016x}", xxh64(raw.as_bytes(), 0))
    }
}
