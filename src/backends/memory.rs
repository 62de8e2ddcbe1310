//! An in-memory backend using `dashmap`.
//!
//! Intended for tests and single-process deployments. Entries expire via
//! `Instant` arithmetic; expired entries are swept on access. There is no
//! capacity limit and no eviction of its own: production deployments point
//! the cache at a real store (memcached, Redis) and let it evict.

use super::*;
use dashmap::DashMap;
use std::time::{Duration, Instant};

/// An entry in the in-memory store.
#[derive(Debug)]
struct StoreEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl StoreEntry {
    fn new(value: Value, ttl: u64) -> Self {
        Self {
            value,
            expires_at: (ttl > 0).then(|| Instant::now() + Duration::from_secs(ttl)),
        }
    }

    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// An in-memory key-value backend using `dashmap`.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    store: DashMap<Key, StoreEntry>,
    metrics: crate::metrics::Metrics,
}

impl MemoryBackend {
    /// Creates a new empty `MemoryBackend`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a reference to the metrics instance.
    pub fn metrics(&self) -> &crate::metrics::Metrics {
        &self.metrics
    }

    /// Returns the current number of live entries.
    pub fn len(&self) -> usize {
        self.cleanup_expired();
        self.store.len()
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes expired entries.
    fn cleanup_expired(&self) {
        let now = Instant::now();
        self.store.retain(|_, entry| !entry.expired(now));
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        // The shard read guard must be dropped before removing, so the
        // expired case only records what it saw and cleans up afterwards.
        let expired = match self.store.get(key) {
            Some(entry) if !entry.expired(Instant::now()) => {
                self.metrics.record_hit();
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.store.remove(key);
        }
        self.metrics.record_miss();
        None
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> crate::Result<Option<Value>> {
        self.metrics.record_round_trip();
        Ok(self.lookup(key))
    }

    async fn get_multi(&self, keys: &[Key]) -> crate::Result<HashMap<Key, Value>> {
        self.metrics.record_round_trip();
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.lookup(key) {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, key: Key, value: Value, ttl: u64) -> crate::Result<()> {
        self.metrics.record_round_trip();
        self.store.insert(key, StoreEntry::new(value, ttl));
        self.metrics.record_insertion();
        Ok(())
    }

    async fn set_multi(&self, entries: Vec<(Key, Value)>, ttl: u64) -> crate::Result<()> {
        self.metrics.record_round_trip();
        for (key, value) in entries {
            self.store.insert(key, StoreEntry::new(value, ttl));
            self.metrics.record_insertion();
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> crate::Result<()> {
        self.metrics.record_round_trip();
        self.store.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    async fn test_get_set() {
        let backend = MemoryBackend::new();
        let key = "test_key".to_string();
        let value = b"test_value".to_vec();

        backend.set(key.clone(), value.clone(), 0).await.unwrap();
        let result = backend.get(&key).await.unwrap();
        assert_eq!(result, Some(value));

        backend.delete(&key).await.unwrap();
        assert_eq!(backend.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multi_ops_are_single_round_trips() {
        let backend = MemoryBackend::new();

        backend
            .set_multi(
                vec![
                    ("a".to_string(), b"1".to_vec()),
                    ("b".to_string(), b"2".to_vec()),
                ],
                0,
            )
            .await
            .unwrap();
        assert_eq!(backend.metrics().round_trips(), 1);

        let found = backend
            .get_multi(&["a".to_string(), "b".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(backend.metrics().round_trips(), 2);

        assert_eq!(found.len(), 2);
        assert_eq!(found.get("a"), Some(&b"1".to_vec()));
        assert!(!found.contains_key("missing"));
    }

    #[tokio::test]
    #[serial]
    async fn test_ttl() {
        let backend = MemoryBackend::new();
        let key = "test_ttl".to_string();
        let value = b"test_value".to_vec();

        backend.set(key.clone(), value, 1).await.unwrap();

        assert!(backend.get(&key).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(backend.get(&key).await.unwrap().is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_metrics() {
        let backend = MemoryBackend::new();
        let key = "test_metrics".to_string();
        let value = b"test_value".to_vec();

        assert_eq!(backend.metrics().hits(), 0);
        assert_eq!(backend.metrics().misses(), 0);

        assert!(backend.get(&key).await.unwrap().is_none());
        assert_eq!(backend.metrics().misses(), 1);

        backend.set(key.clone(), value, 0).await.unwrap();
        assert!(backend.get(&key).await.unwrap().is_some());
        assert_eq!(backend.metrics().hits(), 1);
        assert_eq!(backend.metrics().insertions(), 1);
    }
}
