//! The per-request tag tree: a stack of memoization frames.
//!
//! Each `remember`/`wrap` call pushes a frame that accumulates the tag
//! fingerprints its computation depends on. When a frame pops, its tags are
//! unioned into its parent, so an outer cached value ends up depending on
//! every tag any nested computation used, declared or not. Heritable tag
//! keys flow the other way: a frame's heritable set is copied into each
//! child, which is how one declaration covers an entire subtree.
//!
//! The root frame also carries the request-local memo primed by `load`;
//! lookups walk from the current frame to the root, so preloaded entries
//! are visible to arbitrarily deep nested calls.

use crate::store::TaggedValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One in-flight memoized call.
#[derive(Debug, Default)]
struct Frame {
    /// Accumulated tag-key to fingerprint for this frame.
    tags: BTreeMap<String, String>,
    /// Heritable tag keys declared here or at any ancestor.
    heritable: BTreeSet<String>,
    /// Request-scoped memo of validated store entries.
    local: HashMap<String, TaggedValue>,
}

/// The frame stack for one logical request. Empty when no call is active.
#[derive(Debug, Default)]
pub(crate) struct TagTree {
    frames: Vec<Frame>,
}

impl TagTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Whether a root frame currently exists.
    pub(crate) fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Creates the root frame if none exists. Returns true when this call
    /// created it; the caller is then the root and must tear down on exit.
    pub(crate) fn init(&mut self) -> bool {
        if self.frames.is_empty() {
            self.frames.push(Frame::default());
            true
        } else {
            false
        }
    }

    /// Pushes a child frame seeded with `seed` fingerprints. The child
    /// inherits the parent's heritable set plus `new_heritable`.
    pub(crate) fn advance(
        &mut self,
        seed: BTreeMap<String, String>,
        new_heritable: BTreeSet<String>,
    ) {
        let mut heritable = self
            .frames
            .last()
            .map(|parent| parent.heritable.clone())
            .unwrap_or_default();
        heritable.extend(new_heritable);

        self.frames.push(Frame {
            tags: seed,
            heritable,
            local: HashMap::new(),
        });
    }

    /// Pops the current frame and unions its tags into the parent. The
    /// frame's memo is dropped with it; only tags bubble up.
    pub(crate) fn pop_merge(&mut self) {
        if let Some(child) = self.frames.pop() {
            if let Some(parent) = self.frames.last_mut() {
                parent.tags.extend(child.tags);
            }
        }
    }

    /// Discards every frame. Called by the root caller on exit.
    pub(crate) fn teardown(&mut self) {
        self.frames.clear();
    }

    /// Unions `tags` into the current frame.
    pub(crate) fn merge_into_current(&mut self, tags: &BTreeMap<String, String>) {
        if let Some(current) = self.frames.last_mut() {
            current
                .tags
                .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }

    /// Snapshot of the current frame's accumulated tags.
    pub(crate) fn current_tags(&self) -> BTreeMap<String, String> {
        self.frames
            .last()
            .map(|frame| frame.tags.clone())
            .unwrap_or_default()
    }

    /// The heritable tag keys in force for the current frame.
    pub(crate) fn current_heritable(&self) -> BTreeSet<String> {
        self.frames
            .last()
            .map(|frame| frame.heritable.clone())
            .unwrap_or_default()
    }

    /// Looks `hkey` up in the memo, walking from the current frame to the
    /// root so ancestors' preloads are visible to descendants.
    pub(crate) fn lookup_local(&self, hkey: &str) -> Option<&TaggedValue> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.local.get(hkey))
    }

    /// Adds validated entries to the current frame's memo.
    pub(crate) fn add_local<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, TaggedValue)>,
    {
        if let Some(current) = self.frames.last_mut() {
            current.local.extend(entries);
        }
    }

    #[cfg(test)]
    fn depth(&self) -> usize {
        self.frames.len()
    }
}
