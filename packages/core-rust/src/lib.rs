//! Lattice Core -- block storage contract, MurmurHash3, persistent hash-trie.
//!
//! This crate provides the storage layer under the Lattice graph engine:
//!
//! - **Storage** ([`storage`]): the [`StorageManager`] contract plus the
//!   in-memory (testing, fault-injectable) and redb-backed (production)
//!   implementations
//! - **Hash** ([`hash`]): 32-bit MurmurHash3 used for trie key routing
//! - **HTree** ([`htree`]): persistent hash-trie mapping byte keys to
//!   byte payloads inside any storage manager
//! - **Errors** ([`error`]): [`StorageError`] shared by all of the above

pub mod error;
pub mod hash;
pub mod htree;
pub mod storage;

// Errors
pub use error::{AccessOp, StorageError};

// Hash
pub use hash::{murmur3_32, TRIE_HASH_SEED};

// HTree
pub use htree::{
    HTree, HTreeIterator, MAX_BUCKET_ELEMENTS, MAX_PAGE_CHILDREN, MAX_TREE_DEPTH, PAGE_LEVEL_BITS,
};

// Storage
pub use storage::{
    DiskStorageManager, MemoryStorageManager, StorageManager, MAX_ROOT_SLOTS, NIL_LOCATION,
};
