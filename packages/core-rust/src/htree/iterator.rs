//! Depth-first iterator over a hash-trie.
//!
//! The iterator keeps a stack of node locations and yields bucket
//! entries as it reaches them. It takes no lock: the tree may mutate
//! while an iteration is in flight, in which case the iterator yields a
//! best-effort snapshot (entries may be missed or seen twice). Storage
//! errors do not abort the scan; the last one is recorded on
//! [`HTreeIterator::last_error`] for the caller to check afterwards.

use std::sync::Arc;

use crate::error::StorageError;
use crate::htree::node::TrieNode;
use crate::storage::{StorageManager, NIL_LOCATION};

/// Iterator over all `(key, value)` pairs of an
/// [`HTree`](crate::htree::HTree).
pub struct HTreeIterator {
    sm: Arc<dyn StorageManager>,
    stack: Vec<u64>,
    entries: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    /// Last storage or decoding error encountered during the scan.
    pub last_error: Option<StorageError>,
}

impl HTreeIterator {
    pub(crate) fn new(sm: Arc<dyn StorageManager>, root: u64) -> Self {
        Self {
            sm,
            stack: vec![root],
            entries: Vec::new().into_iter(),
            last_error: None,
        }
    }

    fn fetch_node(&self, location: u64) -> Result<TrieNode, StorageError> {
        let data = match self.sm.fetch_cached(location)? {
            Some(data) => data,
            None => self.sm.fetch(location)?,
        };
        TrieNode::decode(&data)
    }
}

impl Iterator for HTreeIterator {
    type Item = (Vec<u8>, Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.entries.next() {
                return Some(entry);
            }
            let location = self.stack.pop()?;
            match self.fetch_node(location) {
                Ok(TrieNode::Page(page)) => {
                    // Reverse push so children are visited slot 0 first,
                    // keeping the order stable between mutations.
                    for &child in page.children.iter().rev() {
                        if child != NIL_LOCATION {
                            self.stack.push(child);
                        }
                    }
                }
                Ok(TrieNode::Bucket(bucket)) => {
                    self.entries = bucket
                        .entries
                        .into_iter()
                        .map(|(key, value)| (key.into_vec(), value.into_vec()))
                        .collect::<Vec<_>>()
                        .into_iter();
                }
                Err(err) => {
                    // Best-effort: skip the unreadable subtree.
                    self.last_error = Some(err);
                }
            }
        }
    }
}
