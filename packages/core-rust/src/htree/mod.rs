//! Persistent hash-trie keyed by byte strings.
//!
//! An [`HTree`] is a map of arbitrary byte keys to byte payloads stored
//! inside a [`StorageManager`]. Keys are routed by their 32-bit
//! MurmurHash3 (seed [`TRIE_HASH_SEED`]), 8 bits per level, most
//! significant byte first:
//!
//! - **Pages** are inner nodes with [`MAX_PAGE_CHILDREN`] child slots
//! - **Buckets** are leaves holding at most [`MAX_BUCKET_ELEMENTS`]
//!   pairs; at the maximum depth they grow unboundedly instead
//! - A full bucket above the maximum depth splits into a page one level
//!   deeper, re-inserting its entries by the next hash byte
//! - Removal frees empty buckets and unlinks empty non-root pages
//!
//! Each tree serializes its own mutations with an internal mutex.
//! Readers are not coordinated with writers; callers needing a stable
//! view across several trees hold their own lock (the graph manager's
//! readers-writer lock does this).

mod node;

pub mod iterator;

pub use iterator::HTreeIterator;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_bytes::ByteBuf;

use crate::error::StorageError;
use crate::hash::{murmur3_32, TRIE_HASH_SEED};
use crate::htree::node::{Bucket, Page, TrieNode};
use crate::storage::{StorageManager, NIL_LOCATION};

/// Deepest page level; pages exist at depths `0..=MAX_TREE_DEPTH`.
pub const MAX_TREE_DEPTH: usize = 3;

/// Hash bits consumed per trie level.
pub const PAGE_LEVEL_BITS: u32 = 8;

/// Child slots per page (`2^PAGE_LEVEL_BITS`).
pub const MAX_PAGE_CHILDREN: usize = 256;

/// Pairs a bucket holds before splitting (unbounded at maximum depth).
pub const MAX_BUCKET_ELEMENTS: usize = 8;

/// Persistent hash-trie over a [`StorageManager`].
///
/// The tree's root page location can be anchored in one of the storage
/// manager's root slots and reloaded with [`HTree::load`].
pub struct HTree {
    sm: Arc<dyn StorageManager>,
    root: u64,
    lock: Mutex<()>,
}

impl HTree {
    /// Creates a new empty tree, allocating its root page.
    pub fn new(sm: Arc<dyn StorageManager>) -> Result<Self, StorageError> {
        let root = sm.insert(TrieNode::Page(Page::new(0)).encode()?)?;
        Ok(Self {
            sm,
            root,
            lock: Mutex::new(()),
        })
    }

    /// Reattaches to an existing tree by its root page location.
    #[must_use]
    pub fn load(sm: Arc<dyn StorageManager>, location: u64) -> Self {
        Self {
            sm,
            root: location,
            lock: Mutex::new(()),
        }
    }

    /// Location of the root page, suitable for a storage root slot.
    #[must_use]
    pub fn location(&self) -> u64 {
        self.root
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.get_value_and_location(key)?.0)
    }

    /// Returns whether `key` is present.
    pub fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.get_value_and_location(key)?.0.is_some())
    }

    /// Returns the value under `key` together with the location of the
    /// bucket that holds (or would hold) it; `NIL_LOCATION` if the walk
    /// ended at an empty page slot.
    pub fn get_value_and_location(
        &self,
        key: &[u8],
    ) -> Result<(Option<Vec<u8>>, u64), StorageError> {
        let hash = murmur3_32(key, TRIE_HASH_SEED);
        let mut location = self.root;
        loop {
            match self.fetch_node(location)? {
                TrieNode::Page(page) => {
                    let child = page.children[page.child_index(hash)];
                    if child == NIL_LOCATION {
                        return Ok((None, NIL_LOCATION));
                    }
                    location = child;
                }
                TrieNode::Bucket(bucket) => {
                    let value = bucket
                        .position(key)
                        .map(|pos| bucket.entries[pos].1.clone().into_vec());
                    return Ok((value, location));
                }
            }
        }
    }

    /// Stores `value` under `key`, returning the previous value if any.
    pub fn put(&self, key: &[u8], value: Vec<u8>) -> Result<Option<Vec<u8>>, StorageError> {
        let _guard = self.lock.lock();
        let hash = murmur3_32(key, TRIE_HASH_SEED);
        let mut page_location = self.root;
        loop {
            let TrieNode::Page(mut page) = self.fetch_node(page_location)? else {
                return Err(StorageError::Codec(format!(
                    "expected a page at location {page_location}"
                )));
            };
            let idx = page.child_index(hash);
            let child = page.children[idx];

            if child == NIL_LOCATION {
                let mut bucket = Bucket::new(page.depth + 1);
                bucket
                    .entries
                    .push((ByteBuf::from(key.to_vec()), ByteBuf::from(value)));
                let location = self.sm.insert(TrieNode::Bucket(bucket).encode()?)?;
                page.children[idx] = location;
                self.store_node(page_location, &TrieNode::Page(page))?;
                return Ok(None);
            }

            match self.fetch_node(child)? {
                TrieNode::Page(_) => {
                    page_location = child;
                }
                TrieNode::Bucket(mut bucket) => {
                    if let Some(pos) = bucket.position(key) {
                        let old = std::mem::replace(
                            &mut bucket.entries[pos].1,
                            ByteBuf::from(value),
                        );
                        self.store_node(child, &TrieNode::Bucket(bucket))?;
                        return Ok(Some(old.into_vec()));
                    }

                    if bucket.entries.len() < MAX_BUCKET_ELEMENTS
                        || usize::from(bucket.depth) > MAX_TREE_DEPTH
                    {
                        bucket
                            .entries
                            .push((ByteBuf::from(key.to_vec()), ByteBuf::from(value)));
                        self.store_node(child, &TrieNode::Bucket(bucket))?;
                        return Ok(None);
                    }

                    // Full bucket: split one level deeper, then retry the
                    // insert from the new page.
                    let new_location = self.split_bucket(&bucket)?;
                    self.sm.free(child)?;
                    page.children[idx] = new_location;
                    self.store_node(page_location, &TrieNode::Page(page))?;
                    page_location = new_location;
                }
            }
        }
    }

    /// Removes `key`, returning the previous value if any.
    pub fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let _guard = self.lock.lock();
        let hash = murmur3_32(key, TRIE_HASH_SEED);
        let mut path: Vec<(u64, Page, usize)> = Vec::new();
        let mut location = self.root;
        loop {
            match self.fetch_node(location)? {
                TrieNode::Page(page) => {
                    let idx = page.child_index(hash);
                    let child = page.children[idx];
                    if child == NIL_LOCATION {
                        return Ok(None);
                    }
                    path.push((location, page, idx));
                    location = child;
                }
                TrieNode::Bucket(mut bucket) => {
                    let Some(pos) = bucket.position(key) else {
                        return Ok(None);
                    };
                    let (_, old) = bucket.entries.remove(pos);

                    if bucket.entries.is_empty() {
                        self.sm.free(location)?;
                        self.unlink_empty(&mut path)?;
                    } else {
                        self.store_node(location, &TrieNode::Bucket(bucket))?;
                    }
                    return Ok(Some(old.into_vec()));
                }
            }
        }
    }

    /// Iterates all entries depth-first. Best-effort across mutations;
    /// storage errors are recorded on the iterator, not raised.
    #[must_use]
    pub fn iter(&self) -> HTreeIterator {
        HTreeIterator::new(Arc::clone(&self.sm), self.root)
    }

    fn fetch_node(&self, location: u64) -> Result<TrieNode, StorageError> {
        let data = match self.sm.fetch_cached(location)? {
            Some(data) => data,
            None => self.sm.fetch(location)?,
        };
        TrieNode::decode(&data)
    }

    fn store_node(&self, location: u64, node: &TrieNode) -> Result<(), StorageError> {
        self.sm.update(location, node.encode()?)
    }

    /// Distributes a full bucket's entries into a new page one level
    /// deeper and returns the new page's location.
    ///
    /// # Panics
    ///
    /// Panics if the bucket already sits below the maximum depth; such a
    /// bucket grows unboundedly and must never be split.
    fn split_bucket(&self, bucket: &Bucket) -> Result<u64, StorageError> {
        assert!(
            usize::from(bucket.depth) <= MAX_TREE_DEPTH,
            "bucket split beyond maximum trie depth"
        );

        let mut page = Page::new(bucket.depth);
        let mut slots: Vec<Option<Bucket>> = vec![None; MAX_PAGE_CHILDREN];
        for (key, value) in &bucket.entries {
            let hash = murmur3_32(key, TRIE_HASH_SEED);
            let idx = page.child_index(hash);
            slots[idx]
                .get_or_insert_with(|| Bucket::new(bucket.depth + 1))
                .entries
                .push((key.clone(), value.clone()));
        }
        for (idx, slot) in slots.into_iter().enumerate() {
            if let Some(child_bucket) = slot {
                let location = self.sm.insert(TrieNode::Bucket(child_bucket).encode()?)?;
                page.children[idx] = location;
            }
        }
        self.sm.insert(TrieNode::Page(page).encode()?)
    }

    /// Unlinks the freed child from its parent page, then frees pages
    /// that became completely empty, cascading towards the root. The
    /// root page itself is never freed.
    fn unlink_empty(&self, path: &mut Vec<(u64, Page, usize)>) -> Result<(), StorageError> {
        while let Some((page_location, mut page, idx)) = path.pop() {
            page.children[idx] = NIL_LOCATION;
            if page.is_empty() && page_location != self.root {
                self.sm.free(page_location)?;
            } else {
                self.store_node(page_location, &TrieNode::Page(page))?;
                break;
            }
        }
        Ok(())
    }
}

impl fmt::Display for HTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "HTree(root={})", self.root)?;
        self.fmt_node(f, self.root, 0)
    }
}

impl HTree {
    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, location: u64, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self.fetch_node(location) {
            Ok(TrieNode::Page(page)) => {
                let occupied = page
                    .children
                    .iter()
                    .filter(|&&child| child != NIL_LOCATION)
                    .count();
                writeln!(
                    f,
                    "{pad}Page depth={} children={occupied}/{MAX_PAGE_CHILDREN}",
                    page.depth
                )?;
                for &child in &page.children {
                    if child != NIL_LOCATION {
                        self.fmt_node(f, child, indent + 1)?;
                    }
                }
                Ok(())
            }
            Ok(TrieNode::Bucket(bucket)) => {
                writeln!(
                    f,
                    "{pad}Bucket depth={} entries={}",
                    bucket.depth,
                    bucket.entries.len()
                )
            }
            Err(err) => writeln!(f, "{pad}<unreadable node at {location}: {err}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorageManager;

    fn make_tree() -> (Arc<MemoryStorageManager>, HTree) {
        let sm = Arc::new(MemoryStorageManager::new("test"));
        let tree = HTree::new(Arc::clone(&sm) as Arc<dyn StorageManager>).expect("new tree");
        (sm, tree)
    }

    /// Collects `count` distinct keys whose hashes share the same most
    /// significant byte, so they all land in the same root-level slot.
    fn colliding_keys(count: usize) -> Vec<Vec<u8>> {
        let target = murmur3_32(b"seed-key", TRIE_HASH_SEED) >> 24;
        let mut keys = Vec::new();
        let mut i = 0_u64;
        while keys.len() < count {
            let key = format!("collide-{i}").into_bytes();
            if murmur3_32(&key, TRIE_HASH_SEED) >> 24 == target {
                keys.push(key);
            }
            i += 1;
        }
        keys
    }

    #[test]
    fn put_get_round_trip() {
        let (_, tree) = make_tree();

        assert_eq!(tree.put(b"alpha", b"1".to_vec()).expect("put"), None);
        assert_eq!(tree.put(b"beta", b"2".to_vec()).expect("put"), None);

        assert_eq!(tree.get(b"alpha").expect("get"), Some(b"1".to_vec()));
        assert_eq!(tree.get(b"beta").expect("get"), Some(b"2".to_vec()));
        assert_eq!(tree.get(b"gamma").expect("get"), None);
    }

    #[test]
    fn put_returns_previous_value() {
        let (_, tree) = make_tree();

        assert_eq!(tree.put(b"key", b"old".to_vec()).expect("put"), None);
        assert_eq!(
            tree.put(b"key", b"new".to_vec()).expect("put"),
            Some(b"old".to_vec())
        );
        assert_eq!(tree.get(b"key").expect("get"), Some(b"new".to_vec()));
    }

    #[test]
    fn remove_returns_previous_value() {
        let (_, tree) = make_tree();

        tree.put(b"key", b"value".to_vec()).expect("put");
        assert_eq!(tree.remove(b"key").expect("remove"), Some(b"value".to_vec()));
        assert_eq!(tree.remove(b"key").expect("remove"), None);
        assert_eq!(tree.get(b"key").expect("get"), None);
    }

    #[test]
    fn exists_reflects_membership() {
        let (_, tree) = make_tree();

        assert!(!tree.exists(b"key").expect("exists"));
        tree.put(b"key", b"v".to_vec()).expect("put");
        assert!(tree.exists(b"key").expect("exists"));
    }

    #[test]
    fn get_value_and_location_names_the_bucket() {
        let (_, tree) = make_tree();

        tree.put(b"key", b"v".to_vec()).expect("put");
        let (value, location) = tree.get_value_and_location(b"key").expect("get");
        assert_eq!(value, Some(b"v".to_vec()));
        assert_ne!(location, NIL_LOCATION);

        let (value, location) = tree.get_value_and_location(b"missing").expect("get");
        assert_eq!(value, None);
        // "missing" may or may not route to an existing bucket; if the
        // walk ended at an empty slot the location is nil.
        let _ = location;
    }

    #[test]
    fn bucket_holds_max_elements_then_splits() {
        let (_, tree) = make_tree();
        let keys = colliding_keys(MAX_BUCKET_ELEMENTS + 1);

        // First MAX_BUCKET_ELEMENTS keys share one bucket.
        for key in keys.iter().take(MAX_BUCKET_ELEMENTS) {
            tree.put(key, b"v".to_vec()).expect("put");
        }
        let TrieNode::Page(root) = tree.fetch_node(tree.root).expect("root") else {
            panic!("root must be a page");
        };
        let hash = murmur3_32(&keys[0], TRIE_HASH_SEED);
        let child = root.children[root.child_index(hash)];
        match tree.fetch_node(child).expect("child") {
            TrieNode::Bucket(bucket) => {
                assert_eq!(bucket.entries.len(), MAX_BUCKET_ELEMENTS);
            }
            TrieNode::Page(_) => panic!("expected a bucket before the split"),
        }

        // One more key forces a split into a deeper page.
        tree.put(&keys[MAX_BUCKET_ELEMENTS], b"v".to_vec())
            .expect("put");
        let TrieNode::Page(root) = tree.fetch_node(tree.root).expect("root") else {
            panic!("root must be a page");
        };
        let child = root.children[root.child_index(hash)];
        match tree.fetch_node(child).expect("child") {
            TrieNode::Page(page) => assert_eq!(usize::from(page.depth), 1),
            TrieNode::Bucket(_) => panic!("expected a page after the split"),
        }

        // All keys remain reachable.
        for key in &keys {
            assert_eq!(tree.get(key).expect("get"), Some(b"v".to_vec()));
        }
    }

    #[test]
    fn bucket_at_maximum_depth_grows_unboundedly() {
        // Attach directly to a deepest-level page so every insert lands
        // in a depth-4 bucket, which must never split.
        let sm = Arc::new(MemoryStorageManager::new("test"));
        let sm_dyn: Arc<dyn StorageManager> = Arc::clone(&sm) as _;
        #[allow(clippy::cast_possible_truncation)]
        let root = sm_dyn
            .insert(
                TrieNode::Page(Page::new(MAX_TREE_DEPTH as u8))
                    .encode()
                    .expect("encode"),
            )
            .expect("insert");
        let tree = HTree::load(sm_dyn, root);

        // Keys sharing the least significant hash byte collide at depth 3.
        let target = murmur3_32(b"seed-key", TRIE_HASH_SEED) & 0xFF;
        let mut keys = Vec::new();
        let mut i = 0_u64;
        while keys.len() < MAX_BUCKET_ELEMENTS * 2 {
            let key = format!("deep-{i}").into_bytes();
            if murmur3_32(&key, TRIE_HASH_SEED) & 0xFF == target {
                keys.push(key);
            }
            i += 1;
        }

        for key in &keys {
            tree.put(key, b"v".to_vec()).expect("put");
        }
        for key in &keys {
            assert_eq!(tree.get(key).expect("get"), Some(b"v".to_vec()));
        }
    }

    #[test]
    #[should_panic(expected = "beyond maximum trie depth")]
    fn splitting_a_maximum_depth_bucket_panics() {
        let (_, tree) = make_tree();
        #[allow(clippy::cast_possible_truncation)]
        let bucket = Bucket::new(MAX_TREE_DEPTH as u8 + 1);
        let _ = tree.split_bucket(&bucket);
    }

    #[test]
    fn remove_frees_empty_buckets_and_pages() {
        let (_, tree) = make_tree();
        let keys = colliding_keys(MAX_BUCKET_ELEMENTS + 1);

        for key in &keys {
            tree.put(key, b"v".to_vec()).expect("put");
        }
        for key in &keys {
            assert!(tree.remove(key).expect("remove").is_some());
        }

        // Root slot for the colliding keys is empty again.
        let TrieNode::Page(root) = tree.fetch_node(tree.root).expect("root") else {
            panic!("root must be a page");
        };
        let hash = murmur3_32(&keys[0], TRIE_HASH_SEED);
        assert_eq!(root.children[root.child_index(hash)], NIL_LOCATION);
    }

    #[test]
    fn tree_survives_reload_from_location() {
        let sm = Arc::new(MemoryStorageManager::new("test"));
        let sm_dyn: Arc<dyn StorageManager> = Arc::clone(&sm) as _;
        let tree = HTree::new(Arc::clone(&sm_dyn)).expect("new");
        tree.put(b"key", b"value".to_vec()).expect("put");

        let reloaded = HTree::load(sm_dyn, tree.location());
        assert_eq!(reloaded.get(b"key").expect("get"), Some(b"value".to_vec()));
    }

    #[test]
    fn display_renders_structure() {
        let (_, tree) = make_tree();
        tree.put(b"key", b"value".to_vec()).expect("put");
        let rendered = tree.to_string();
        assert!(rendered.contains("HTree(root="));
        assert!(rendered.contains("Bucket depth=1 entries=1"));
    }

    #[test]
    fn storage_errors_surface_from_mutations() {
        let (sm, tree) = make_tree();
        tree.put(b"key", b"value".to_vec()).expect("put");

        let (_, bucket_location) = tree.get_value_and_location(b"key").expect("get");
        sm.inject_fault(bucket_location, crate::error::AccessOp::Update);
        assert!(tree.put(b"key", b"other".to_vec()).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use std::collections::HashMap;

    use proptest::prelude::*;

    use super::*;
    use crate::storage::MemoryStorageManager;

    proptest! {
        /// The tree behaves exactly like a `HashMap` over any sequence
        /// of puts and removes.
        #[test]
        fn behaves_like_a_hash_map(
            ops in proptest::collection::vec(
                ("[a-f0-9]{1,6}", proptest::option::of("[a-z]{0,4}")),
                1..60,
            ),
        ) {
            let sm = Arc::new(MemoryStorageManager::new("prop"));
            let tree = HTree::new(sm as Arc<dyn StorageManager>).expect("new");
            let mut model: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();

            for (key, value) in ops {
                let key = key.into_bytes();
                match value {
                    Some(value) => {
                        let value = value.into_bytes();
                        let expected = model.insert(key.clone(), value.clone());
                        let actual = tree.put(&key, value).expect("put");
                        prop_assert_eq!(expected, actual);
                    }
                    None => {
                        let expected = model.remove(&key);
                        let actual = tree.remove(&key).expect("remove");
                        prop_assert_eq!(expected, actual);
                    }
                }
            }

            for (key, value) in &model {
                let got = tree.get(key).expect("get");
                prop_assert_eq!(got.as_ref(), Some(value));
            }
        }
    }
}
