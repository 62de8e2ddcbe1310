//! Tag variants and their resolution to tag keys.
//!
//! A tag is a surrogate key describing a dependency of a cached value.
//! Plain tags resolve to themselves. Heritable tags resolve like plain tags
//! but additionally apply to every computation nested under the frame that
//! declared them. Sharding tags spread a large keyspace (say, one tag per
//! user) over a bounded number of buckets so that clearing one bucket
//! invalidates exactly that partition.

use xxhash_rust::xxh64::xxh64;

/// A dependency tag attached to cached values.
///
/// # Examples
///
/// ```
/// use ttcache::tags::Tag;
///
/// let plain: Tag = "posts".into();
/// assert_eq!(plain.resolve(), "posts");
///
/// let heritable = Tag::heritable("tenant:42");
/// assert!(heritable.is_heritable());
/// assert_eq!(heritable.resolve(), "tenant:42");
///
/// let shard = Tag::sharding("user", "u-9182", 64);
/// assert!(shard.resolve().starts_with("user:"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    /// A literal tag string, e.g. `"posts"` or `"user:123"`.
    Plain(String),
    /// A tag that also applies to every computation nested under its frame.
    Heritable(String),
    /// A tag derived from a routing value modulo a bucket count.
    Sharding {
        /// Namespace the buckets live under.
        namespace: String,
        /// Value routed to a bucket, e.g. a user id.
        routing: String,
        /// Number of buckets. Zero is treated as one.
        buckets: u32,
    },
}

impl Tag {
    /// Creates a plain tag.
    pub fn plain<S: Into<String>>(name: S) -> Self {
        Self::Plain(name.into())
    }

    /// Creates a heritable tag.
    pub fn heritable<S: Into<String>>(name: S) -> Self {
        Self::Heritable(name.into())
    }

    /// Creates a sharding tag. The routing value is hashed with a fixed
    /// XXH64 so the bucket assignment is stable across processes.
    pub fn sharding<N, R>(namespace: N, routing: R, buckets: u32) -> Self
    where
        N: Into<String>,
        R: Into<String>,
    {
        Self::Sharding {
            namespace: namespace.into(),
            routing: routing.into(),
            buckets,
        }
    }

    /// Resolves the tag to the string form used as its tag key.
    pub fn resolve(&self) -> String {
        match self {
            Self::Plain(name) | Self::Heritable(name) => name.clone(),
            Self::Sharding {
                namespace,
                routing,
                buckets,
            } => {
                let bucket = xxh64(routing.as_bytes(), 0) % u64::from((*buckets).max(1));
                format!("{}:{}", namespace, bucket)
            }
        }
    }

    /// Whether this tag applies to nested frames as well.
    pub fn is_heritable(&self) -> bool {
        matches!(self, Self::Heritable(_))
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Self::Plain(s)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self::Plain(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_and_heritable_resolve_to_their_name() {
        assert_eq!(Tag::plain("posts").resolve(), "posts");
        assert_eq!(Tag::heritable("tenant:7").resolve(), "tenant:7");
        assert!(!Tag::plain("posts").is_heritable());
        assert!(Tag::heritable("tenant:7").is_heritable());
    }

    #[test]
    fn sharding_is_deterministic() {
        let a = Tag::sharding("user", "abc", 16).resolve();
        let b = Tag::sharding("user", "abc", 16).resolve();
        assert_eq!(a, b);
        assert!(a.starts_with("user:"));

        let bucket: u64 = a.rsplit(':').next().unwrap().parse().unwrap();
        assert!(bucket < 16);
    }

    #[test]
    fn sharding_zero_buckets_collapses_to_one() {
        assert_eq!(
            Tag::sharding("user", "abc", 0).resolve(),
            Tag::sharding("user", "abc", 1).resolve()
        );
    }

    #[test]
    fn sharding_buckets_cover_the_range() {
        // With 2 buckets and a handful of routing values, both buckets show up.
        let mut seen = std::collections::HashSet::new();
        for i in 0..64 {
            let resolved = Tag::sharding("shard", format!("v{}", i), 2).resolve();
            seen.insert(resolved);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn string_conversions_produce_plain_tags() {
        let from_str: Tag = "posts".into();
        let from_string: Tag = String::from("posts").into();
        assert_eq!(from_str, from_string);
        assert_eq!(from_str, Tag::plain("posts"));
    }
}
