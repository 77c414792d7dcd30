//! Disk-backed [`GraphStorage`] implementation.
//!
//! One redb database file per storage manager, all inside a single
//! directory. The `main` manager hosts the MainDb record.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use lattice_core::storage::{DiskStorageManager, StorageManager};

use crate::error::{GraphError, GraphResult};
use crate::storage::{GraphStorage, MainDb};

/// Graph storage persisting every manager under one directory.
pub struct DiskGraphStorage {
    dir: PathBuf,
    main: Arc<MainDb>,
    managers: Mutex<BTreeMap<String, Arc<DiskStorageManager>>>,
}

impl DiskGraphStorage {
    /// Opens (or creates) a graph storage rooted at `dir`.
    pub fn open(dir: &Path) -> GraphResult<Self> {
        std::fs::create_dir_all(dir).map_err(GraphError::access)?;

        let main_sm: Arc<dyn StorageManager> = Arc::new(
            DiskStorageManager::open("main", dir).map_err(GraphError::access)?,
        );
        let main = Arc::new(MainDb::open(main_sm)?);
        debug!(dir = %dir.display(), "opened disk graph storage");

        Ok(Self {
            dir: dir.to_path_buf(),
            main,
            managers: Mutex::new(BTreeMap::new()),
        })
    }

    /// Directory holding the database files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl GraphStorage for DiskGraphStorage {
    fn name(&self) -> &str {
        self.dir.to_str().unwrap_or("disk")
    }

    fn main_db(&self) -> Arc<MainDb> {
        Arc::clone(&self.main)
    }

    fn storage_manager(&self, name: &str, create: bool) -> Option<Arc<dyn StorageManager>> {
        let mut managers = self.managers.lock();
        if let Some(manager) = managers.get(name) {
            return Some(Arc::clone(manager) as Arc<dyn StorageManager>);
        }
        if !create && !self.dir.join(format!("{name}.db")).exists() {
            return None;
        }
        match DiskStorageManager::open(name, &self.dir) {
            Ok(manager) => {
                let manager = Arc::new(manager);
                managers.insert(name.to_string(), Arc::clone(&manager));
                Some(manager as Arc<dyn StorageManager>)
            }
            Err(err) => {
                tracing::error!(name, error = %err, "could not open storage manager");
                None
            }
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managers_persist_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");

        {
            let gs = DiskGraphStorage::open(dir.path()).expect("open");
            let sm = gs.storage_manager("part1kind.nodes", true).expect("create");
            let loc = sm.insert(b"data".to_vec()).expect("insert");
            sm.set_root(2, loc);
            sm.flush().expect("flush");
            gs.close().expect("close");
        }

        let gs = DiskGraphStorage::open(dir.path()).expect("reopen");
        // The file exists, so the manager is found without `create`.
        let sm = gs
            .storage_manager("part1kind.nodes", false)
            .expect("reopen manager");
        let loc = sm.root(2);
        assert_eq!(sm.fetch(loc).expect("fetch"), b"data");
    }

    #[test]
    fn missing_manager_without_create_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gs = DiskGraphStorage::open(dir.path()).expect("open");
        assert!(gs.storage_manager("nothere.nodes", false).is_none());
    }

    #[test]
    fn main_db_round_trips_through_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let gs = DiskGraphStorage::open(dir.path()).expect("open");
            gs.main_db().put("key", b"persisted".to_vec());
            gs.main_db().flush().expect("flush");
        }
        let gs = DiskGraphStorage::open(dir.path()).expect("reopen");
        assert_eq!(gs.main_db().get("key"), Some(b"persisted".to_vec()));
    }
}
