//! The tag-tree cache façade.
//!
//! `TtCache` memoizes arbitrary computations in a backing key-value store
//! and tracks, per call tree, which tags each cached result depends on.
//! When a memoized computation calls other memoized computations, the outer
//! result automatically absorbs every tag the inner ones used; clearing any
//! of those tags invalidates the whole chain without the outer scope ever
//! declaring the dependency.
//!
//! One `TtCache` value serves one logical request at a time. Independent
//! requests build independent `TtCache` values over a shared backend `Arc`;
//! the only state they share is the store itself.

use crate::backends::KvBackend;
use crate::error::{Error, Result};
use crate::keys::{IdentityHasher, KeyHasher};
use crate::serialization::{BincodeSerializer, Serializer};
use crate::store::{Payload, TaggedStore, TaggedValue};
use crate::tags::Tag;
use crate::tree::TagTree;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::{Arc, Mutex};

/// What a `remember` computation hands back to the cache.
///
/// Inspected after the callback returns; the variant decides whether and in
/// what shape the value is stored.
#[derive(Debug, Clone, PartialEq)]
pub enum Computed<T> {
    /// Store the value and return it.
    Value(T),
    /// Return the value without storing it. The next call recomputes.
    Bypass(T),
    /// Store the value and surface the tag snapshot to the caller, on this
    /// call and on every subsequent hit.
    Reveal(T),
}

/// A value returned by [`TtCache::remember`].
///
/// `tags()` is `Some` only for values computed or stored under the
/// [`Computed::Reveal`] directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Remembered<T> {
    value: T,
    tags: Option<BTreeMap<String, String>>,
}

impl<T> Remembered<T> {
    /// The cached payload.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes the wrapper, returning the payload.
    pub fn into_value(self) -> T {
        self.value
    }

    /// The tag snapshot, for values stored with [`Computed::Reveal`].
    pub fn tags(&self) -> Option<&BTreeMap<String, String>> {
        self.tags.as_ref()
    }
}

/// Tag-tree memoization cache over a key-value backend.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use ttcache::{backends::memory::MemoryBackend, Computed, Tag, TtCache};
///
/// # async fn example() -> ttcache::Result<()> {
/// let cache = TtCache::new(Arc::new(MemoryBackend::new()));
///
/// let greeting = cache
///     .remember("greeting", 0, &[Tag::plain("copy")], || async {
///         Ok(Computed::Value("hello world".to_string()))
///     })
///     .await?;
/// assert_eq!(greeting.value(), "hello world");
///
/// // Rotating the tag's fingerprint invalidates the entry lazily.
/// cache.clear_tags(&["copy".into()]).await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TtCache {
    store: TaggedStore,
    tree: Mutex<TagTree>,
}

impl TtCache {
    /// Creates a cache over `backend` with the identity key hasher.
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self::with_hasher(backend, Arc::new(IdentityHasher))
    }

    /// Creates a cache over `backend` with a custom key hasher.
    pub fn with_hasher(backend: Arc<dyn KvBackend>, hasher: Arc<dyn KeyHasher>) -> Self {
        Self {
            store: TaggedStore::new(backend, hasher),
            tree: Mutex::new(TagTree::new()),
        }
    }

    /// Memoizes `f` under `key`.
    ///
    /// On a request-local or store hit the callback does not run; the hit's
    /// tag snapshot is merged into the calling frame so enclosing results
    /// inherit the dependency. On a miss the callback runs inside a fresh
    /// frame: tags used by nested `remember`/`wrap` calls bubble into this
    /// frame, and the final accumulated set is stored with the value.
    ///
    /// `ttl` of 0 means no expiry. A finite `ttl` also stamps the frame
    /// with an expiring pseudo-tag, so enclosing cached results expire no
    /// later than this one.
    ///
    /// Callback errors propagate verbatim and nothing is written for this
    /// frame or any enclosing one still in flight. Backend errors never
    /// propagate; the call falls through to the callback uncached.
    pub async fn remember<T, F, Fut>(
        &self,
        key: &str,
        ttl: u64,
        tags: &[Tag],
        f: F,
    ) -> Result<Remembered<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Computed<T>>>,
    {
        let hkey = self.store.hashed_key(key);
        let declared = self.resolve(tags);

        let is_root = self.tree.lock().unwrap().init();

        // Request-local memo, visible from the current frame up to the root.
        let memo_hit = {
            let mut tree = self.tree.lock().unwrap();
            let hit = tree.lookup_local(&hkey).cloned();
            if let Some(value) = &hit {
                tree.merge_into_current(&value.tags);
            }
            hit
        };
        if let Some(value) = memo_hit {
            return self.finish_hit(value, is_root);
        }

        // Store hit: adopt the stored snapshot as our own dependencies.
        if let Some(value) = self.store.get(&hkey).await {
            self.tree
                .lock()
                .unwrap()
                .merge_into_current(&value.tags);
            return self.finish_hit(value, is_root);
        }

        // Miss. Seed a child frame with fingerprints for the declared tags
        // plus every heritable tag in force here.
        let mut fetch_keys: BTreeSet<String> =
            declared.iter().map(|(key, _)| key.clone()).collect();
        fetch_keys.extend(self.tree.lock().unwrap().current_heritable());

        let fetched = self.store.fetch_or_make_tag_hashes(&fetch_keys, ttl).await;
        let mut readonly = fetched.readonly;

        {
            let mut tree = self.tree.lock().unwrap();
            let new_heritable = declared
                .iter()
                .filter(|(_, heritable)| *heritable)
                .map(|(key, _)| key.clone())
                .collect();
            tree.advance(fetched.hashes, new_heritable);
        }

        let computed = match f().await {
            Ok(computed) => computed,
            Err(err) => {
                let mut tree = self.tree.lock().unwrap();
                tree.pop_merge();
                if is_root {
                    tree.teardown();
                }
                return Err(err);
            }
        };

        let (value, reveal) = match computed {
            Computed::Value(value) => (value, false),
            Computed::Bypass(value) => {
                readonly = true;
                (value, false)
            }
            Computed::Reveal(value) => (value, true),
        };

        // The final snapshot includes everything nested calls bubbled up.
        let snapshot = {
            let mut tree = self.tree.lock().unwrap();
            let snapshot = tree.current_tags();
            tree.pop_merge();
            snapshot
        };

        let mut codec_err = None;
        if !readonly {
            match BincodeSerializer::new().serialize(&value) {
                Ok(bytes) => {
                    self.store
                        .store(&hkey, ttl, snapshot.clone(), bytes, reveal)
                        .await;
                }
                Err(err) => codec_err = Some(err),
            }
        }

        if is_root {
            self.tree.lock().unwrap().teardown();
        }
        if let Some(err) = codec_err {
            return Err(err);
        }

        Ok(Remembered {
            value,
            tags: reveal.then_some(snapshot),
        })
    }

    /// Runs `f` inside a frame that declares `tags` without caching the
    /// frame's own result.
    ///
    /// The declared tags, heritable ones included, bubble into every
    /// enclosing `remember` snapshot exactly as if a cached computation had
    /// used them. This is how a request states "everything in this block
    /// depends on `global`" without introducing a cache entry of its own.
    pub async fn wrap<T, F, Fut>(&self, tags: &[Tag], f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let declared = self.resolve(tags);

        let is_root = self.tree.lock().unwrap().init();

        let mut fetch_keys: BTreeSet<String> =
            declared.iter().map(|(key, _)| key.clone()).collect();
        fetch_keys.extend(self.tree.lock().unwrap().current_heritable());

        let fetched = self.store.fetch_or_make_tag_hashes(&fetch_keys, 0).await;

        {
            let mut tree = self.tree.lock().unwrap();
            let new_heritable = declared
                .iter()
                .filter(|(_, heritable)| *heritable)
                .map(|(key, _)| key.clone())
                .collect();
            tree.advance(fetched.hashes, new_heritable);
        }

        let result = f().await;

        let mut tree = self.tree.lock().unwrap();
        tree.pop_merge();
        if is_root {
            tree.teardown();
        }
        drop(tree);

        result
    }

    /// Preloads `keys` into the request-local memo in two store round trips.
    ///
    /// Valid entries become visible to nested `remember` calls for the rest
    /// of the enclosing call tree, and their tags merge into the current
    /// frame. Outside any `remember`/`wrap` call this is a no-op: there is
    /// no frame for the memo to live on.
    pub async fn load(&self, keys: &[&str]) {
        if !self.tree.lock().unwrap().is_active() {
            return;
        }

        let hkeys: Vec<String> = keys.iter().map(|key| self.store.hashed_key(key)).collect();
        let found = self.store.get_multiple(&hkeys).await;
        if found.is_empty() {
            return;
        }

        let mut tree = self.tree.lock().unwrap();
        for value in found.values() {
            tree.merge_into_current(&value.tags);
        }
        tree.add_local(found);
    }

    /// Invalidates every cached value depending on any of `tags` by
    /// rotating their fingerprints. One round trip; repeat calls are
    /// harmless.
    pub async fn clear_tags(&self, tags: &[Tag]) {
        let hashed = tags
            .iter()
            .map(|tag| self.store.hashed_tag(&tag.resolve()))
            .collect();
        self.store.clear_tags(hashed).await;
    }

    /// Resolves declared tags to (hashed tag key, heritable) pairs.
    fn resolve(&self, tags: &[Tag]) -> Vec<(String, bool)> {
        tags.iter()
            .map(|tag| (self.store.hashed_tag(&tag.resolve()), tag.is_heritable()))
            .collect()
    }

    /// Decodes a hit and, for a root call, tears the tree down.
    fn finish_hit<T: DeserializeOwned>(
        &self,
        value: TaggedValue,
        is_root: bool,
    ) -> Result<Remembered<T>> {
        let decoded = decode(value);
        if is_root {
            self.tree.lock().unwrap().teardown();
        }
        decoded
    }
}

fn decode<T: DeserializeOwned>(value: TaggedValue) -> Result<Remembered<T>> {
    let serializer = BincodeSerializer::new();
    match value.payload {
        Payload::Bytes(bytes) => Ok(Remembered {
            value: serializer.deserialize(&bytes)?,
            tags: None,
        }),
        Payload::Tagged(inner) => {
            let TaggedValue { payload, tags } = *inner;
            match payload {
                Payload::Bytes(bytes) => Ok(Remembered {
                    value: serializer.deserialize(&bytes)?,
                    tags: Some(tags),
                }),
                Payload::Tagged(_) => {
                    Err(Error::Codec("doubly nested tagged value".to_string()))
                }
            }
        }
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryBackend;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn cache_and_backend() -> (TtCache, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (TtCache::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn remember_memoizes() {
        let (cache, _) = cache_and_backend();
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let result = cache
                .remember("greeting", 0, &[], || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Computed::Value("hello".to_string()))
                })
                .await
                .unwrap();
            assert_eq!(result.value(), "hello");
            assert!(result.tags().is_none());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bypass_skips_storage() {
        let (cache, _) = cache_and_backend();
        let calls = AtomicU32::new(0);

        for expected in ["first", "second"] {
            let result = cache
                .remember("volatile", 0, &[], || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    let value = if n == 0 { "first" } else { "second" };
                    Ok(Computed::Bypass(value.to_string()))
                })
                .await
                .unwrap();
            assert_eq!(result.value(), expected);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reveal_surfaces_the_snapshot_on_compute_and_on_hit() {
        let (cache, _) = cache_and_backend();

        let computed = cache
            .remember("profile", 0, &[Tag::plain("users")], || async {
                Ok(Computed::Reveal(42u64))
            })
            .await
            .unwrap();
        let revealed = computed.tags().expect("snapshot revealed");
        assert!(revealed.contains_key("t:users"));

        let hit: Remembered<u64> = cache
            .remember("profile", 0, &[], || async { unreachable!("must not recompute") })
            .await
            .unwrap();
        assert_eq!(*hit.value(), 42);
        assert_eq!(hit.tags(), computed.tags());
    }

    #[tokio::test]
    async fn callback_errors_propagate_and_nothing_is_stored() {
        let (cache, backend) = cache_and_backend();

        let result: Result<Remembered<String>> = cache
            .remember("failing", 0, &[], || async {
                Err(Error::other("boom"))
            })
            .await;
        assert_eq!(result.unwrap_err(), Error::Other("boom".to_string()));
        assert!(!cache.tree.lock().unwrap().is_active());
        assert!(backend.get("k:failing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wrap_declares_tags_without_storing() {
        let (cache, backend) = cache_and_backend();

        let value = cache
            .wrap(&[Tag::plain("global")], || async { Ok(7u32) })
            .await
            .unwrap();
        assert_eq!(value, 7);

        // Only the tag fingerprint was written, no cache entry.
        assert!(backend.get("t:global").await.unwrap().is_some());
        assert_eq!(backend.metrics().insertions(), 1);
        assert!(!cache.tree.lock().unwrap().is_active());
    }

    #[tokio::test]
    async fn load_outside_any_frame_is_a_noop() {
        let (cache, backend) = cache_and_backend();
        cache.load(&["a", "b"]).await;
        assert_eq!(backend.metrics().round_trips(), 0);
    }
}
