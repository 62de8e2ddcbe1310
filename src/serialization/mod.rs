//! Serialization support for ttcache.
//!
//! This module provides trait definitions and implementations for
//! serializing and deserializing cache payloads with different formats.
//! The store itself always encodes its envelope with bincode; these
//! serializers cover the opaque user payload inside it.

use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Trait for serializing and deserializing cache payloads.
pub trait Serializer: Send + Sync + Debug {
    /// Serialize a value into bytes.
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize bytes into a value.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Bincode serializer implementation. The default.
#[derive(Debug, Clone, Copy)]
pub struct BincodeSerializer;

impl BincodeSerializer {
    /// Create a new BincodeSerializer.
    pub fn new() -> Self {
        Self
    }
}

impl Default for BincodeSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer for BincodeSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| crate::error::Error::Codec(format!("{}", e)))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| crate::error::Error::Codec(format!("{}", e)))
    }
}

/// JSON serializer implementation.
#[cfg(feature = "serde_json")]
#[derive(Debug, Clone, Copy)]
pub struct JsonSerializer;

#[cfg(feature = "serde_json")]
impl JsonSerializer {
    /// Create a new JsonSerializer.
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "serde_json")]
impl Default for JsonSerializer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "serde_json")]
impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value)
            .map_err(|e| crate::error::Error::Codec(format!("JSON serialization error: {}", e)))
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes)
            .map_err(|e| crate::error::Error::Codec(format!("JSON deserialization error: {}", e)))
    }
}
