//! Error types for the ttcache library.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The main error type for the ttcache library.
#[derive(Debug, thiserror::Error, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// An error that occurred during serialization or deserialization.
    #[error("Codec error: {0}")]
    Codec(String),

    /// The backing store returned an error or an unexpected result.
    #[error("Backend error: {0}")]
    Backend(String),

    /// An error that doesn't fit into other categories. Callback failures
    /// surfaced through `remember`/`wrap` typically use this variant.
    #[error("Cache error: {0}")]
    Other(String),
}

impl Error {
    /// Creates a new backend error.
    pub fn backend<E: fmt::Display>(error: E) -> Self {
        Self::Backend(error.to_string())
    }

    /// Creates a new other error.
    pub fn other<E: fmt::Display>(error: E) -> Self {
        Self::Other(error.to_string())
    }
}

/// A specialized `Result` type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;
