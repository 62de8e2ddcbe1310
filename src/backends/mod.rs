//! Backend implementations for different key-value stores.

use async_trait::async_trait;
use std::{collections::HashMap, fmt::Debug};

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

/// A key in the backing store.
pub type Key = String;

/// A value in the backing store. Values are opaque blobs; the store never
/// interprets them.
pub type Value = Vec<u8>;

/// Trait defining the interface the cache consumes from a key-value store.
///
/// A TTL of 0 means no expiry; a positive TTL is in seconds. `get_multi`
/// returns only the keys that are present. No compare-and-set is required:
/// fingerprint rotation is safe under last-write-wins.
#[async_trait]
pub trait KvBackend: Send + Sync + Debug {
    /// Gets a value from the store by key.
    async fn get(&self, key: &str) -> crate::Result<Option<Value>>;

    /// Gets several values in one round trip. Absent keys are omitted from
    /// the result.
    async fn get_multi(&self, keys: &[Key]) -> crate::Result<HashMap<Key, Value>>;

    /// Sets a value in the store. `ttl` of 0 means no expiry.
    async fn set(&self, key: Key, value: Value, ttl: u64) -> crate::Result<()>;

    /// Sets several values in one round trip, all with the same TTL.
    async fn set_multi(&self, entries: Vec<(Key, Value)>, ttl: u64) -> crate::Result<()>;

    /// Removes a value from the store by key.
    async fn delete(&self, key: &str) -> crate::Result<()>;
}

/// A boxed backend that can be used as a trait object.
pub type Backend = Box<dyn KvBackend>;
