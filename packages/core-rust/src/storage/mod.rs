//! Block-level storage manager contract and its backends.
//!
//! A [`StorageManager`] hands out opaque 64-bit record locations and
//! persists raw byte payloads against them. Higher layers (the hash-trie,
//! the graph engine's metadata map) never see the physical layout; they
//! only deal in locations, payloads, and a small array of reserved root
//! slots used to anchor their entry points.
//!
//! Two implementations are provided:
//!
//! - [`MemoryStorageManager`]: `HashMap`-backed, with a fault-injection
//!   table for exercising error paths in tests
//! - [`DiskStorageManager`]: redb-backed, buffering writes until `flush`

pub mod disk;
pub mod memory;

pub use disk::DiskStorageManager;
pub use memory::MemoryStorageManager;

use crate::error::StorageError;

/// Number of reserved root slots every storage manager provides.
pub const MAX_ROOT_SLOTS: usize = 8;

/// Location value that means "no record". Valid locations start at 1.
pub const NIL_LOCATION: u64 = 0;

/// Block-level record storage.
///
/// Implementations are used as `Arc<dyn StorageManager>` and must be safe
/// to share across threads; all methods take `&self` and synchronize
/// internally. Callers serialize their own payloads.
///
/// `flush` makes all pending writes durable; `rollback` discards pending
/// in-memory changes and restores the last flushed state. Between the
/// two, reads observe the pending state.
pub trait StorageManager: Send + Sync {
    /// Name of this storage manager (diagnostics and error messages).
    fn name(&self) -> &str;

    /// Stores a new record and returns its fresh location.
    fn insert(&self, data: Vec<u8>) -> Result<u64, StorageError>;

    /// Replaces the record at `location`.
    fn update(&self, location: u64, data: Vec<u8>) -> Result<(), StorageError>;

    /// Deallocates the record at `location`.
    fn free(&self, location: u64) -> Result<(), StorageError>;

    /// Reads the record at `location`.
    fn fetch(&self, location: u64) -> Result<Vec<u8>, StorageError>;

    /// Reads the record at `location` from the cache only.
    ///
    /// Never touches the backend; returns `Ok(None)` on a cache miss.
    fn fetch_cached(&self, location: u64) -> Result<Option<Vec<u8>>, StorageError>;

    /// Returns the location anchored at the given root slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= MAX_ROOT_SLOTS`.
    fn root(&self, slot: usize) -> u64;

    /// Anchors a location at the given root slot.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= MAX_ROOT_SLOTS`.
    fn set_root(&self, slot: usize, location: u64);

    /// Makes all pending writes durable.
    fn flush(&self) -> Result<(), StorageError>;

    /// Discards pending writes, restoring the last flushed state.
    fn rollback(&self) -> Result<(), StorageError>;

    /// Flushes and releases the manager.
    fn close(&self) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    /// Verifies `Arc<dyn StorageManager>` compiles (object safety).
    #[test]
    fn storage_manager_is_object_safe() {
        fn _assert_object_safe(_: &Arc<dyn StorageManager>) {}
    }
}
