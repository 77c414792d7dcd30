//! Serialized trie node records: pages and buckets.
//!
//! Every trie node is one storage manager record holding a MessagePack
//! encoded [`TrieNode`]. The enum tag distinguishes pages from buckets,
//! so a child location can be followed without out-of-band type bits.

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::error::StorageError;
use crate::htree::{MAX_PAGE_CHILDREN, MAX_TREE_DEPTH, PAGE_LEVEL_BITS};
use crate::storage::NIL_LOCATION;

/// A single node of the persisted trie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum TrieNode {
    /// Inner node: 256 child slots, each empty or a child location.
    Page(Page),
    /// Leaf node: a small list of key/value pairs.
    Bucket(Bucket),
}

impl TrieNode {
    pub(crate) fn encode(&self) -> Result<Vec<u8>, StorageError> {
        rmp_serde::to_vec(self).map_err(StorageError::codec)
    }

    pub(crate) fn decode(data: &[u8]) -> Result<Self, StorageError> {
        rmp_serde::from_slice(data).map_err(StorageError::codec)
    }
}

/// Inner trie node addressing children by one hash byte.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Page {
    /// Which hash byte this page consumes; the root page has depth 0.
    pub depth: u8,
    /// Child locations indexed by hash byte; `NIL_LOCATION` marks empty.
    pub children: Vec<u64>,
}

impl Page {
    pub(crate) fn new(depth: u8) -> Self {
        Self {
            depth,
            children: vec![NIL_LOCATION; MAX_PAGE_CHILDREN],
        }
    }

    /// Child slot index for `hash` at this page's depth (MSB first).
    pub(crate) fn child_index(&self, hash: u32) -> usize {
        debug_assert!(usize::from(self.depth) <= MAX_TREE_DEPTH);
        let shift = u32::from(8 * (3 - self.depth));
        ((hash >> shift) & ((1 << PAGE_LEVEL_BITS) - 1)) as usize
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.children.iter().all(|&child| child == NIL_LOCATION)
    }
}

/// Leaf trie node holding key/value pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Bucket {
    /// Number of hash bytes consumed on the path to this bucket.
    pub depth: u8,
    /// Stored pairs, in insertion order.
    pub entries: Vec<(ByteBuf, ByteBuf)>,
}

impl Bucket {
    pub(crate) fn new(depth: u8) -> Self {
        Self {
            depth,
            entries: Vec::new(),
        }
    }

    pub(crate) fn position(&self, key: &[u8]) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k.as_slice() == key)
    }
}
