//! In-memory [`GraphStorage`] implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use lattice_core::storage::{MemoryStorageManager, StorageManager};

use crate::error::{GraphError, GraphResult};
use crate::storage::{GraphStorage, MainDb};

/// Graph storage holding everything in memory. Used by tests and
/// short-lived tooling; nothing survives the process.
pub struct MemoryGraphStorage {
    name: String,
    main: Arc<MainDb>,
    managers: Mutex<BTreeMap<String, Arc<MemoryStorageManager>>>,
}

impl MemoryGraphStorage {
    /// Creates an empty in-memory graph storage.
    pub fn new(name: &str) -> GraphResult<Self> {
        let main_sm: Arc<dyn StorageManager> = Arc::new(MemoryStorageManager::new("main"));
        let main = Arc::new(MainDb::open(main_sm)?);
        Ok(Self {
            name: name.to_string(),
            main,
            managers: Mutex::new(BTreeMap::new()),
        })
    }

    /// Returns the concrete manager for a name, if it exists.
    ///
    /// Tests use this to reach the fault-injection facilities of
    /// [`MemoryStorageManager`].
    #[must_use]
    pub fn manager(&self, name: &str) -> Option<Arc<MemoryStorageManager>> {
        self.managers.lock().get(name).cloned()
    }
}

impl GraphStorage for MemoryGraphStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn main_db(&self) -> Arc<MainDb> {
        Arc::clone(&self.main)
    }

    fn storage_manager(&self, name: &str, create: bool) -> Option<Arc<dyn StorageManager>> {
        let mut managers = self.managers.lock();
        if let Some(manager) = managers.get(name) {
            return Some(Arc::clone(manager) as Arc<dyn StorageManager>);
        }
        if !create {
            return None;
        }
        let manager = Arc::new(MemoryStorageManager::new(name));
        managers.insert(name.to_string(), Arc::clone(&manager));
        Some(manager as Arc<dyn StorageManager>)
    }

    fn close(&self) -> GraphResult<()> {
        self.main.flush()?;
        for manager in self.managers.lock().values() {
            manager
                .close()
                .map_err(|err| GraphError::Flushing(err.to_string()))?;
        }
        Ok(())
    }
}
