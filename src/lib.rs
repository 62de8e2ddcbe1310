#![warn(missing_docs)]
//! # ttcache
//!
//! A tag-tree memoization cache for Rust: memoize arbitrary computations in
//! a remote key-value store and invalidate them in O(1) by *tag*, even when
//! the dependency was never declared at the call site.
//!
//! ## Features
//!
//! - **Nested memoization**: computations cached inside other computations
//!   propagate their tags upward, so the outer cached result depends on
//!   everything the inner ones depended on
//! - **O(1) lazy invalidation**: clearing a tag rotates one random-nonce
//!   fingerprint; no scanning, no key registries
//! - **Heritable tags**: declare a tag once and it applies to every
//!   computation nested under that frame
//! - **Sharding tags**: spread an unbounded tag space over a fixed number
//!   of buckets with a stable hash
//! - **TTL cascade**: a nested computation's expiry bounds the lifetime of
//!   every enclosing cached result
//! - **Multi-get preloading**: `load` primes a whole batch of keys in two
//!   round trips, regardless of batch size
//! - **Pluggable Backends**: in-memory and Redis backends included; any
//!   get/multi-get/set store fits behind the [`backends::KvBackend`] trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ttcache::{backends::memory::MemoryBackend, Computed, Tag, TtCache};
//!
//! # async fn example() -> ttcache::Result<()> {
//! let cache = TtCache::new(Arc::new(MemoryBackend::new()));
//!
//! let page = cache
//!     .remember("home", 0, &[], || async {
//!         // Inner results are cached with their own tags; the outer
//!         // "home" entry inherits them all.
//!         let user = cache
//!             .remember("user:1", 0, &[Tag::plain("user:1")], || async {
//!                 Ok(Computed::Value("Alice".to_string()))
//!             })
//!             .await?;
//!         Ok(Computed::Value(format!("Welcome back, {}!", user.value())))
//!     })
//!     .await?;
//! assert_eq!(page.value(), "Welcome back, Alice!");
//!
//! // Invalidate the user and every cached page that ever included them.
//! cache.clear_tags(&["user:1".into()]).await;
//! # Ok(())
//! # }
//! ```
//!
//! One [`TtCache`] value serves one logical request; create one per request
//! over a shared backend `Arc`. There is no process-global state.

pub mod backends;
mod cache;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod serialization;
mod store;
pub mod tags;
mod tree;

pub use cache::{Computed, Remembered, TtCache};
pub use error::Error;
pub use tags::Tag;

/// The main cache result type.
pub type Result<T> = std::result::Result<T, error::Error>;

// Re-export the default backend for easier access.
#[cfg(feature = "memory")]
pub use backends::memory::MemoryBackend;

/// Common prelude for using the library.
pub mod prelude {
    pub use crate::{
        backends::{Backend, KvBackend},
        error::Error,
        keys::{IdentityHasher, KeyHasher},
        Computed, Remembered, Result, Tag, TtCache,
    };
    #[cfg(feature = "memory")]
    pub use crate::MemoryBackend;
}
