//! Partition-scoped cache key encoding.
//!
//! A [`CacheKey`] cannot be built without a [`PartitionToken`], so every
//! store access is scoped to one keyspace by construction.
//!
//! # Binary Format
//!
//! - Bytes 0-15: partition digest (blake3, truncated)
//! - Byte 16: separator (0xFF)
//! - Byte 17: scope tag
//! - Bytes 18-33: scope identity digest (root or token scopes only)
//! - Remaining bytes: the UTF-8 name
//!
//! Fixed-width digests keep keys short enough for LMDB and make the
//! partition and root prefixes true byte prefixes of every key under them.

use sharecache_core::{PartitionToken, RootRef};

/// Separator byte between the partition digest and the rest of the key.
const SEPARATOR: u8 = 0xFF;

/// Width of partition and scope digests.
const DIGEST_LEN: usize = 16;

/// Length of a partition prefix.
pub const PARTITION_PREFIX_LEN: usize = DIGEST_LEN + 1;

/// Length of a root or token prefix.
pub const SCOPE_PREFIX_LEN: usize = PARTITION_PREFIX_LEN + 1 + DIGEST_LEN;

const TAG_ROOT: u8 = 0x01;
const TAG_TOKEN: u8 = 0x02;
const TAG_DATA: u8 = 0x03;

/// Which part of a partition a key addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyScope {
    /// Positional addressing: entries produced by one classpath root.
    Root(String),
    /// Token addressing: entries filed under an arbitrary token string.
    Token(String),
    /// Generic resource data keyed only by name.
    Data,
}

impl KeyScope {
    /// Scope for a classpath root.
    pub fn root(root: &RootRef) -> Self {
        Self::Root(root.id().to_string())
    }

    fn tag(&self) -> u8 {
        match self {
            Self::Root(_) => TAG_ROOT,
            Self::Token(_) => TAG_TOKEN,
            Self::Data => TAG_DATA,
        }
    }

    fn identity(&self) -> Option<&str> {
        match self {
            Self::Root(id) | Self::Token(id) => Some(id),
            Self::Data => None,
        }
    }
}

/// A cache key scoped to a partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Private inner data - cannot be constructed externally
    inner: CacheKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKeyInner {
    partition: PartitionToken,
    scope: KeyScope,
    name: String,
}

impl CacheKey {
    /// Create a key in `partition`.
    pub fn new(partition: PartitionToken, scope: KeyScope, name: impl Into<String>) -> Self {
        Self {
            inner: CacheKeyInner {
                partition,
                scope,
                name: name.into(),
            },
        }
    }

    /// Positional key for `name` as produced by `root`.
    pub fn positional(partition: PartitionToken, root: &RootRef, name: impl Into<String>) -> Self {
        Self::new(partition, KeyScope::root(root), name)
    }

    /// Generic data key.
    pub fn data(partition: PartitionToken, name: impl Into<String>) -> Self {
        Self::new(partition, KeyScope::Data, name)
    }

    /// Partition this key belongs to.
    pub fn partition(&self) -> &PartitionToken {
        &self.inner.partition
    }

    /// Scope within the partition.
    pub fn scope(&self) -> &KeyScope {
        &self.inner.scope
    }

    /// Class or resource name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Encode for storage.
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SCOPE_PREFIX_LEN + self.inner.name.len());
        bytes.extend_from_slice(&partition_prefix(&self.inner.partition));
        bytes.push(self.inner.scope.tag());
        if let Some(identity) = self.inner.scope.identity() {
            bytes.extend_from_slice(&digest(identity.as_bytes()));
        }
        bytes.extend_from_slice(self.inner.name.as_bytes());
        bytes
    }
}

/// A byte prefix selecting a group of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPrefix {
    /// Every key in a partition.
    Partition(PartitionToken),
    /// Every key produced by one root within a partition.
    Root(PartitionToken, String),
}

impl KeyPrefix {
    /// Prefix covering one root.
    pub fn root(partition: PartitionToken, root: &RootRef) -> Self {
        Self::Root(partition, root.id().to_string())
    }

    /// Encode for prefix scans.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Partition(partition) => partition_prefix(partition).to_vec(),
            Self::Root(partition, id) => {
                let mut bytes = Vec::with_capacity(SCOPE_PREFIX_LEN);
                bytes.extend_from_slice(&partition_prefix(partition));
                bytes.push(TAG_ROOT);
                bytes.extend_from_slice(&digest(id.as_bytes()));
                bytes
            }
        }
    }
}

fn partition_prefix(partition: &PartitionToken) -> [u8; PARTITION_PREFIX_LEN] {
    let mut prefix = [0u8; PARTITION_PREFIX_LEN];
    prefix[..DIGEST_LEN].copy_from_slice(&digest(partition.as_str().as_bytes()));
    prefix[DIGEST_LEN] = SEPARATOR;
    prefix
}

fn digest(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let hash = blake3::hash(bytes);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(&hash.as_bytes()[..DIGEST_LEN]);
    out
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn scope_strategy() -> impl Strategy<Value = KeyScope> {
        prop_oneof![
            "[a-z/.]{1,12}".prop_map(KeyScope::Root),
            "[a-z]{1,8}".prop_map(KeyScope::Token),
            Just(KeyScope::Data),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Different keys never share an encoding.
        #[test]
        fn prop_encoding_is_injective(
            p1 in "[a-zA-Z0-9]{0,6}",
            p2 in "[a-zA-Z0-9]{0,6}",
            s1 in scope_strategy(),
            s2 in scope_strategy(),
            n1 in "[a-zA-Z$.]{0,10}",
            n2 in "[a-zA-Z$.]{0,10}",
        ) {
            let k1 = CacheKey::new(PartitionToken::new(p1), s1, n1);
            let k2 = CacheKey::new(PartitionToken::new(p2), s2, n2);
            if k1 == k2 {
                prop_assert_eq!(k1.encode(), k2.encode());
            } else {
                prop_assert_ne!(k1.encode(), k2.encode());
            }
        }

        /// The partition prefix is a byte prefix of every key in it.
        #[test]
        fn prop_partition_prefix_is_prefix(
            partition in "[a-z]{0,6}",
            scope in scope_strategy(),
            name in "[a-zA-Z$.]{0,10}",
        ) {
            let token = PartitionToken::new(partition);
            let key = CacheKey::new(token.clone(), scope, name).encode();
            let prefix = KeyPrefix::Partition(token).encode();
            prop_assert!(key.starts_with(&prefix));
        }

        /// The root prefix is a byte prefix of every positional key for that root.
        #[test]
        fn prop_root_prefix_is_prefix(
            partition in "[a-z]{0,6}",
            root in "[a-z/.]{1,12}",
            name in "[a-zA-Z$.]{0,10}",
        ) {
            let token = PartitionToken::new(partition);
            let key = CacheKey::new(token.clone(), KeyScope::Root(root.clone()), name).encode();
            let prefix = KeyPrefix::Root(token, root).encode();
            prop_assert_eq!(&key[..SCOPE_PREFIX_LEN], &prefix[..]);
        }
    }
}
