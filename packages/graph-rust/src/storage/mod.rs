//! Graph storage composition: named storage managers plus the MainDb.
//!
//! A [`GraphStorage`] hands out block-level storage managers by name
//! (lazily created, cached per name) and owns the shared [`MainDb`]
//! metadata namespace. The graph manager asks for one manager per
//! (partition, kind) store or index and never touches files directly.

pub mod disk;
pub mod maindb;
pub mod memory;

pub use disk::DiskGraphStorage;
pub use maindb::{MainDb, ROOT_SLOT_MAIN_DB};
pub use memory::MemoryGraphStorage;

use std::sync::Arc;

use lattice_core::storage::StorageManager;

use crate::error::GraphResult;

/// Root slot of the primary tree inside a store manager (attribute-list
/// tree of `.nodes`, the only tree of `.edges` and the indexes).
pub const ROOT_SLOT_PRIMARY_TREE: usize = 2;

/// Root slot of the attribute-value tree inside a `.nodes` manager.
pub const ROOT_SLOT_SECONDARY_TREE: usize = 3;

/// Storage composition consumed by the graph manager.
///
/// Implementations cache managers per name, so repeated requests return
/// the same `Arc` and share pending state.
pub trait GraphStorage: Send + Sync {
    /// Name of this storage (diagnostics).
    fn name(&self) -> &str;

    /// The shared metadata namespace.
    fn main_db(&self) -> Arc<MainDb>;

    /// Returns the named storage manager.
    ///
    /// With `create` set, a missing manager is created; otherwise `None`
    /// is returned for managers that do not exist yet.
    fn storage_manager(&self, name: &str, create: bool) -> Option<Arc<dyn StorageManager>>;

    /// Flushes and releases every managed resource.
    fn close(&self) -> GraphResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verifies `Arc<dyn GraphStorage>` compiles (object safety).
    #[test]
    fn graph_storage_is_object_safe() {
        fn _assert_object_safe(_: &Arc<dyn GraphStorage>) {}
    }
}
