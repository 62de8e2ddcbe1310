//! Tagged store: values bundled with tag-fingerprint snapshots.
//!
//! Every cached value is written together with a snapshot of the current
//! fingerprint of each tag it depends on. A tag's current fingerprint is a
//! random nonce living in the backing store; rotating it invalidates every
//! value whose snapshot captured the old nonce, without enumerating them.
//! Validity is checked lazily on read by comparing the snapshot against the
//! current fingerprints, so invalidation costs one write per tag no matter
//! how many values depend on it.
//!
//! Backend failures never escape this module: reads degrade to absent,
//! fingerprint fetches go read-only, writes are dropped.

use crate::backends::KvBackend;
use crate::keys::KeyHasher;
use crate::serialization::{BincodeSerializer, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Prefix for TTL pseudo-tag keys. These are synthetic tags whose expiry
/// drives cascade invalidation of enclosing cached values; they are never
/// user-constructed and never hashed.
const TTL_TAG_PREFIX: &str = "ttcache:ttl";

/// The unit written to the backing store under a cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TaggedValue {
    /// The cached payload.
    pub(crate) payload: Payload,
    /// Snapshot of tag-key to fingerprint taken at write time.
    pub(crate) tags: BTreeMap<String, String>,
}

/// Payload of a [`TaggedValue`]. Reveal-tags storage nests a second
/// TaggedValue so that hits can surface the snapshot to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Payload {
    /// Serialized user payload.
    Bytes(Vec<u8>),
    /// A nested TaggedValue, stored for the reveal-tags directive.
    Tagged(Box<TaggedValue>),
}

/// Result of [`TaggedStore::fetch_or_make_tag_hashes`].
#[derive(Debug, Default)]
pub(crate) struct TagHashes {
    /// Tag key to current fingerprint, including the TTL pseudo-tag when a
    /// finite TTL was requested.
    pub(crate) hashes: BTreeMap<String, String>,
    /// Set when the store could not be read or written; the caller must not
    /// cache anything tagged with these hashes.
    pub(crate) readonly: bool,
}

/// Mints a fresh 128-bit fingerprint as 32 lowercase hex chars.
fn mint_fingerprint() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Wraps the KV backend with tag-snapshot storage and validity checks.
#[derive(Debug, Clone)]
pub(crate) struct TaggedStore {
    backend: Arc<dyn KvBackend>,
    hasher: Arc<dyn KeyHasher>,
}

impl TaggedStore {
    pub(crate) fn new(backend: Arc<dyn KvBackend>, hasher: Arc<dyn KeyHasher>) -> Self {
        Self { backend, hasher }
    }

    /// Storage key for a user cache key.
    pub(crate) fn hashed_key(&self, raw: &str) -> String {
        format!("k:{}", self.hasher.hash(raw))
    }

    /// Storage key for a resolved tag.
    pub(crate) fn hashed_tag(&self, resolved: &str) -> String {
        format!("t:{}", self.hasher.hash(resolved))
    }

    /// Fetches the TaggedValue at `hkey` and checks its snapshot against the
    /// current fingerprints. Invalid, missing, undecodable or unreachable
    /// all read as absent.
    pub(crate) async fn get(&self, hkey: &str) -> Option<TaggedValue> {
        let bytes = self.backend.get(hkey).await.ok().flatten()?;
        let value: TaggedValue = BincodeSerializer::new().deserialize(&bytes).ok()?;

        if value.tags.is_empty() {
            return Some(value);
        }

        let tag_keys: Vec<String> = value.tags.keys().cloned().collect();
        let current = self.backend.get_multi(&tag_keys).await.ok()?;
        if snapshot_matches(&value.tags, &current) {
            Some(value)
        } else {
            None
        }
    }

    /// Fetches several TaggedValues and validates them against the union of
    /// their snapshots in one extra round trip: two round trips total,
    /// regardless of the number of keys.
    pub(crate) async fn get_multiple(&self, hkeys: &[String]) -> HashMap<String, TaggedValue> {
        let fetched = match self.backend.get_multi(hkeys).await {
            Ok(fetched) => fetched,
            Err(_) => return HashMap::new(),
        };

        let serializer = BincodeSerializer::new();
        let decoded: Vec<(String, TaggedValue)> = fetched
            .into_iter()
            .filter_map(|(key, bytes)| {
                serializer
                    .deserialize::<TaggedValue>(&bytes)
                    .ok()
                    .map(|value| (key, value))
            })
            .collect();

        let tag_keys: Vec<String> = decoded
            .iter()
            .flat_map(|(_, value)| value.tags.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let current = if tag_keys.is_empty() {
            HashMap::new()
        } else {
            match self.backend.get_multi(&tag_keys).await {
                Ok(current) => current,
                Err(_) => return HashMap::new(),
            }
        };

        decoded
            .into_iter()
            .filter(|(_, value)| snapshot_matches(&value.tags, &current))
            .collect()
    }

    /// Ensures every tag in `tag_keys` has a current fingerprint, minting
    /// and persisting fresh ones for tags the store does not know yet.
    ///
    /// A TTL pseudo-tag is minted for every call. When `ttl > 0` it is kept
    /// in the result and stored with expiry `ttl`, so any enclosing value
    /// that absorbs this frame's tags expires with it. When `ttl == 0` it is
    /// dropped from the result and never stored, and nothing TTL-related
    /// flows upward.
    pub(crate) async fn fetch_or_make_tag_hashes(
        &self,
        tag_keys: &BTreeSet<String>,
        ttl: u64,
    ) -> TagHashes {
        let ttl_tag = format!(
            "{}:{}:{:016x}",
            TTL_TAG_PREFIX,
            ttl,
            rand::random::<u64>()
        );

        let mut wanted: Vec<String> = Vec::with_capacity(tag_keys.len() + 1);
        wanted.push(ttl_tag.clone());
        wanted.extend(tag_keys.iter().cloned());

        let fetched = match self.backend.get_multi(&wanted).await {
            Ok(fetched) => fetched,
            Err(_) => {
                return TagHashes {
                    hashes: BTreeMap::new(),
                    readonly: true,
                }
            }
        };

        let mut hashes = BTreeMap::new();
        let mut missing: Vec<(String, String)> = Vec::new();
        for key in wanted {
            match fetched.get(&key).and_then(|bytes| as_fingerprint(bytes)) {
                Some(current) => {
                    hashes.insert(key, current);
                }
                None => {
                    let minted = mint_fingerprint();
                    hashes.insert(key.clone(), minted.clone());
                    missing.push((key, minted));
                }
            }
        }

        let mut readonly = false;

        // The pseudo-tag nonce is fresh, so it is always among the missing.
        if let Some(at) = missing.iter().position(|(key, _)| *key == ttl_tag) {
            let (key, fingerprint) = missing.remove(at);
            if ttl == 0 {
                hashes.remove(&key);
            } else if self
                .backend
                .set(key, fingerprint.into_bytes(), ttl)
                .await
                .is_err()
            {
                readonly = true;
            }
        }

        if !missing.is_empty() {
            let entries = missing
                .into_iter()
                .map(|(key, fingerprint)| (key, fingerprint.into_bytes()))
                .collect();
            if self.backend.set_multi(entries, 0).await.is_err() {
                readonly = true;
            }
        }

        TagHashes { hashes, readonly }
    }

    /// Writes `payload` under `hkey` with the given snapshot. With `reveal`
    /// the stored value nests a second TaggedValue so subsequent hits can
    /// hand the snapshot back to the caller. Write failures are dropped.
    pub(crate) async fn store(
        &self,
        hkey: &str,
        ttl: u64,
        snapshot: BTreeMap<String, String>,
        payload: Vec<u8>,
        reveal: bool,
    ) {
        let inner = TaggedValue {
            payload: Payload::Bytes(payload),
            tags: snapshot.clone(),
        };
        let value = if reveal {
            TaggedValue {
                payload: Payload::Tagged(Box::new(inner)),
                tags: snapshot,
            }
        } else {
            inner
        };

        if let Ok(bytes) = BincodeSerializer::new().serialize(&value) {
            let _ = self.backend.set(hkey.to_string(), bytes, ttl).await;
        }
    }

    /// Rotates the fingerprint of every given tag key in one round trip.
    /// Every value whose snapshot referenced an old fingerprint becomes
    /// invalid on its next read.
    pub(crate) async fn clear_tags(&self, hashed_tags: Vec<String>) {
        if hashed_tags.is_empty() {
            return;
        }

        let entries = hashed_tags
            .into_iter()
            .map(|key| (key, mint_fingerprint().into_bytes()))
            .collect();
        let _ = self.backend.set_multi(entries, 0).await;
    }
}

/// Whether every snapshot entry equals the current fingerprint in the store.
/// A missing current fingerprint means invalid.
fn snapshot_matches(
    snapshot: &BTreeMap<String, String>,
    current: &HashMap<String, Vec<u8>>,
) -> bool {
    snapshot.iter().all(|(tag, fingerprint)| {
        current
            .get(tag)
            .and_then(|bytes| as_fingerprint(bytes))
            .is_some_and(|cur| cur == *fingerprint)
    })
}

/// Decodes stored fingerprint bytes. Anything non-UTF-8 is treated as absent.
fn as_fingerprint(bytes: &[u8]) -> Option<String> {
    String::from_utf8(bytes.to_vec()).ok()
}
