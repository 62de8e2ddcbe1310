//! Redis backend implementation.
//!
//! This backend stores cache entries and tag fingerprints in a Redis
//! database, letting several application instances share one tag-tree cache.
//! Invalidation stays O(1): clearing a tag rotates one fingerprint key, no
//! matter how many cached values referenced it.
//!
//! # Implementation Details
//!
//! * Values are stored as raw bytes; the tagged-store envelope is already
//!   serialized when it reaches the backend
//! * `get_multi` issues a single `MGET`; `set_multi` a single pipeline
//! * TTL uses Redis's native expiration (`SETEX`)
//! * All keys are prefixed (default: "ttcache:") to avoid collisions

use crate::{backends::KvBackend, error::Error, Result};
use async_trait::async_trait;
use redis::{Client, RedisError};
use std::collections::HashMap;

/// Redis-based key-value backend for distributed caching.
///
/// # Example
///
/// ```rust,no_run
/// use ttcache::backends::redis::RedisBackend;
///
/// # async fn run() -> ttcache::Result<()> {
/// let backend = RedisBackend::new("redis://127.0.0.1:6379", Some("myapp:")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RedisBackend {
    /// Redis client
    client: Client,
    /// Key prefix for all entries
    prefix: String,
}

impl RedisBackend {
    /// Creates a new RedisBackend with the given Redis URL.
    ///
    /// # Arguments
    /// * `redis_url` - The URL to the Redis server (e.g., "redis://127.0.0.1:6379")
    /// * `prefix` - Optional prefix for all keys to avoid collisions
    ///
    /// # Errors
    /// Returns an error if connection to Redis fails.
    pub async fn new(redis_url: &str, prefix: Option<&str>) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| Error::Backend(format!("Failed to create Redis client: {}", e)))?;

        let _ = client
            .get_async_connection()
            .await
            .map_err(|e| Error::Backend(format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            client,
            prefix: prefix.unwrap_or("ttcache:").to_string(),
        })
    }

    /// Generate a prefixed key for Redis storage
    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Convert Redis errors to ttcache errors
    fn convert_redis_error(err: RedisError) -> Error {
        Error::Backend(format!("Redis error: {}", err))
    }

    async fn connection(&self) -> Result<redis::aio::Connection> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| Error::Backend(format!("Failed to connect to Redis: {}", e)))
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;

        redis::cmd("GET")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(Self::convert_redis_error)
    }

    async fn get_multi(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.connection().await?;

        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(self.prefixed_key(key));
        }

        let values: Vec<Option<Vec<u8>>> = cmd
            .query_async(&mut conn)
            .await
            .map_err(Self::convert_redis_error)?;

        Ok(keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|v| (key.clone(), v)))
            .collect())
    }

    async fn set(&self, key: String, value: Vec<u8>, ttl: u64) -> Result<()> {
        let mut conn = self.connection().await?;
        let redis_key = self.prefixed_key(&key);

        let result: redis::RedisResult<()> = if ttl > 0 {
            redis::cmd("SETEX")
                .arg(redis_key)
                .arg(ttl)
                .arg(value)
                .query_async(&mut conn)
                .await
        } else {
            redis::cmd("SET")
                .arg(redis_key)
                .arg(value)
                .query_async(&mut conn)
                .await
        };

        result.map_err(Self::convert_redis_error)
    }

    async fn set_multi(&self, entries: Vec<(String, Vec<u8>)>, ttl: u64) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        for (key, value) in entries {
            let redis_key = self.prefixed_key(&key);
            if ttl > 0 {
                pipe.cmd("SETEX").arg(redis_key).arg(ttl).arg(value).ignore();
            } else {
                pipe.cmd("SET").arg(redis_key).arg(value).ignore();
            }
        }

        pipe.query_async(&mut conn)
            .await
            .map_err(Self::convert_redis_error)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        let result: redis::RedisResult<i64> = redis::cmd("DEL")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await;

        result.map(|_| ()).map_err(Self::convert_redis_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    async fn create_test_backend() -> Result<RedisBackend> {
        RedisBackend::new("redis://127.0.0.1:6379", Some("test:")).await
    }

    #[tokio::test]
    #[serial]
    #[ignore]
    async fn test_get_set() -> Result<()> {
        let backend = create_test_backend().await?;

        let key = "test_key".to_string();
        let value = b"test_value".to_vec();

        backend.set(key.clone(), value.clone(), 0).await?;

        let result = backend.get(&key).await?;
        assert_eq!(result, Some(value));

        backend.delete(&key).await?;
        assert_eq!(backend.get(&key).await?, None);

        Ok(())
    }

    #[tokio::test]
    #[serial]
    #[ignore]
    async fn test_multi_ops() -> Result<()> {
        let backend = create_test_backend().await?;

        backend
            .set_multi(
                vec![
                    ("m1".to_string(), b"1".to_vec()),
                    ("m2".to_string(), b"2".to_vec()),
                ],
                0,
            )
            .await?;

        let found = backend
            .get_multi(&["m1".to_string(), "m2".to_string(), "m3".to_string()])
            .await?;

        assert_eq!(found.len(), 2);
        assert_eq!(found.get("m1"), Some(&b"1".to_vec()));

        backend.delete("m1").await?;
        backend.delete("m2").await?;

        Ok(())
    }

    #[tokio::test]
    #[serial]
    #[ignore]
    async fn test_ttl() -> Result<()> {
        let backend = create_test_backend().await?;

        let key = "test_ttl".to_string();
        let value = b"test_value".to_vec();

        backend.set(key.clone(), value, 1).await?;

        assert!(backend.get(&key).await?.is_some());

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        assert!(backend.get(&key).await?.is_none());

        Ok(())
    }
}
