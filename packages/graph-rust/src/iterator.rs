//! Node key iteration.
//!
//! Walks the attribute-list entries of a node store's attribute tree
//! and yields the node keys. Like the underlying trie iterator this is
//! a best-effort snapshot: the tree may mutate during the scan, and
//! storage errors are recorded rather than raised, so callers should
//! check [`NodeKeyIterator::last_error`] after the loop rather than
//! mid-scan.

use lattice_core::error::StorageError;
use lattice_core::htree::HTreeIterator;

use crate::keys::PREFIX_ATTR_LIST;

/// Iterator over the node keys of one (partition, kind).
pub struct NodeKeyIterator {
    inner: HTreeIterator,
}

impl NodeKeyIterator {
    pub(crate) fn new(inner: HTreeIterator) -> Self {
        Self { inner }
    }

    /// Last storage error encountered during the scan, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&StorageError> {
        self.inner.last_error.as_ref()
    }
}

impl Iterator for NodeKeyIterator {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, _) = self.inner.next()?;
            if let [PREFIX_ATTR_LIST, node_key @ ..] = key.as_slice() {
                return Some(String::from_utf8_lossy(node_key).into_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lattice_core::htree::HTree;
    use lattice_core::storage::{MemoryStorageManager, StorageManager};

    use super::*;
    use crate::keys::{attr_list_key, edge_specs_key};

    #[test]
    fn yields_only_attribute_list_keys() {
        let sm: Arc<dyn StorageManager> = Arc::new(MemoryStorageManager::new("t"));
        let tree = HTree::new(sm).expect("tree");

        tree.put(&attr_list_key("node-a"), vec![1]).expect("put");
        tree.put(&attr_list_key("node-b"), vec![2]).expect("put");
        // Edge bookkeeping entries in the same tree are skipped.
        tree.put(&edge_specs_key("node-a"), vec![3]).expect("put");

        let mut iter = NodeKeyIterator::new(tree.iter());
        let mut keys: Vec<String> = iter.by_ref().collect();
        keys.sort();
        assert_eq!(keys, vec!["node-a".to_string(), "node-b".to_string()]);
        assert!(iter.last_error().is_none());
    }

    #[test]
    fn empty_tree_yields_nothing() {
        let sm: Arc<dyn StorageManager> = Arc::new(MemoryStorageManager::new("t"));
        let tree = HTree::new(sm).expect("tree");
        assert_eq!(NodeKeyIterator::new(tree.iter()).count(), 0);
    }
}
