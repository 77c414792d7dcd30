//! Persistent [`StorageManager`] implementation backed by redb.
//!
//! All mutations are buffered in memory and applied to the database in a
//! single redb write transaction when `flush` is called; `rollback`
//! simply drops the buffer and re-reads the anchor state. Reads consult
//! the buffer first, then a read-through cache of committed records, and
//! only then the database file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use crate::error::StorageError;
use crate::storage::{StorageManager, MAX_ROOT_SLOTS, NIL_LOCATION};

const RECORDS: TableDefinition<u64, &[u8]> = TableDefinition::new("records");
const ROOTS: TableDefinition<u8, u64> = TableDefinition::new("roots");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const NEXT_LOCATION_KEY: &str = "next_location";

/// Buffered state between two flushes.
struct Pending {
    /// Location -> new payload, or `None` for a pending free.
    writes: HashMap<u64, Option<Vec<u8>>>,
    /// Read-through cache of committed records.
    cache: HashMap<u64, Vec<u8>>,
    roots: [u64; MAX_ROOT_SLOTS],
    roots_dirty: bool,
    next_location: u64,
}

/// redb-backed storage manager for production use.
///
/// One database file per manager, named `<name>.db` inside the directory
/// handed to [`DiskStorageManager::open`].
pub struct DiskStorageManager {
    name: String,
    path: PathBuf,
    db: Database,
    pending: Mutex<Pending>,
}

impl DiskStorageManager {
    /// Opens (or creates) the manager's database file under `dir`.
    pub fn open(name: &str, dir: &Path) -> Result<Self, StorageError> {
        let path = dir.join(format!("{name}.db"));
        let db = Database::create(&path).map_err(StorageError::backend)?;

        let mut roots = [NIL_LOCATION; MAX_ROOT_SLOTS];
        let next_location;

        // Bootstrap transaction: creates the tables on first open and
        // reads back the anchor state.
        let txn = db.begin_write().map_err(StorageError::backend)?;
        {
            txn.open_table(RECORDS).map_err(StorageError::backend)?;

            let roots_table = txn.open_table(ROOTS).map_err(StorageError::backend)?;
            for (slot, root) in roots.iter_mut().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                let stored = roots_table
                    .get(slot as u8)
                    .map_err(StorageError::backend)?;
                if let Some(value) = stored {
                    *root = value.value();
                }
            }
            drop(roots_table);

            let mut meta = txn.open_table(META).map_err(StorageError::backend)?;
            let existing = meta
                .get(NEXT_LOCATION_KEY)
                .map_err(StorageError::backend)?
                .map(|value| value.value());
            next_location = match existing {
                Some(value) => value,
                None => {
                    meta.insert(NEXT_LOCATION_KEY, 1)
                        .map_err(StorageError::backend)?;
                    1
                }
            };
        }
        txn.commit().map_err(StorageError::backend)?;

        debug!(name, next_location, "opened disk storage manager");

        Ok(Self {
            name: name.to_string(),
            path,
            db,
            pending: Mutex::new(Pending {
                writes: HashMap::new(),
                cache: HashMap::new(),
                roots,
                roots_dirty: false,
                next_location,
            }),
        })
    }

    /// Path of the backing database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn not_found(&self, location: u64) -> StorageError {
        StorageError::NotFound {
            manager: self.name.clone(),
            location,
        }
    }

    /// Reads a committed record directly from the database.
    fn fetch_committed(&self, location: u64) -> Result<Option<Vec<u8>>, StorageError> {
        let txn = self.db.begin_read().map_err(StorageError::backend)?;
        let table = txn.open_table(RECORDS).map_err(StorageError::backend)?;
        Ok(table
            .get(location)
            .map_err(StorageError::backend)?
            .map(|guard| guard.value().to_vec()))
    }

    /// Checks that a location currently resolves to a record, consulting
    /// pending writes, the cache, and finally the database.
    fn exists(&self, pending: &Pending, location: u64) -> Result<bool, StorageError> {
        if let Some(write) = pending.writes.get(&location) {
            return Ok(write.is_some());
        }
        if pending.cache.contains_key(&location) {
            return Ok(true);
        }
        Ok(self.fetch_committed(location)?.is_some())
    }
}

impl StorageManager for DiskStorageManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert(&self, data: Vec<u8>) -> Result<u64, StorageError> {
        let mut pending = self.pending.lock();
        let location = pending.next_location;
        pending.next_location += 1;
        pending.writes.insert(location, Some(data));
        Ok(location)
    }

    fn update(&self, location: u64, data: Vec<u8>) -> Result<(), StorageError> {
        let mut pending = self.pending.lock();
        if !self.exists(&pending, location)? {
            return Err(self.not_found(location));
        }
        pending.writes.insert(location, Some(data));
        Ok(())
    }

    fn free(&self, location: u64) -> Result<(), StorageError> {
        let mut pending = self.pending.lock();
        if !self.exists(&pending, location)? {
            return Err(self.not_found(location));
        }
        pending.writes.insert(location, None);
        pending.cache.remove(&location);
        Ok(())
    }

    fn fetch(&self, location: u64) -> Result<Vec<u8>, StorageError> {
        let mut pending = self.pending.lock();
        if let Some(write) = pending.writes.get(&location) {
            return write.clone().ok_or_else(|| self.not_found(location));
        }
        if let Some(data) = pending.cache.get(&location) {
            return Ok(data.clone());
        }
        let data = self
            .fetch_committed(location)?
            .ok_or_else(|| self.not_found(location))?;
        pending.cache.insert(location, data.clone());
        Ok(data)
    }

    fn fetch_cached(&self, location: u64) -> Result<Option<Vec<u8>>, StorageError> {
        let pending = self.pending.lock();
        if let Some(write) = pending.writes.get(&location) {
            return Ok(write.clone());
        }
        Ok(pending.cache.get(&location).cloned())
    }

    fn root(&self, slot: usize) -> u64 {
        assert!(slot < MAX_ROOT_SLOTS, "root slot {slot} out of range");
        self.pending.lock().roots[slot]
    }

    fn set_root(&self, slot: usize, location: u64) {
        assert!(slot < MAX_ROOT_SLOTS, "root slot {slot} out of range");
        let mut pending = self.pending.lock();
        pending.roots[slot] = location;
        pending.roots_dirty = true;
    }

    fn flush(&self) -> Result<(), StorageError> {
        let mut pending = self.pending.lock();
        if pending.writes.is_empty() && !pending.roots_dirty {
            return Ok(());
        }

        let txn = self.db.begin_write().map_err(StorageError::backend)?;
        {
            let mut records = txn.open_table(RECORDS).map_err(StorageError::backend)?;
            for (location, write) in &pending.writes {
                match write {
                    Some(data) => {
                        records
                            .insert(location, data.as_slice())
                            .map_err(StorageError::backend)?;
                    }
                    None => {
                        records.remove(location).map_err(StorageError::backend)?;
                    }
                }
            }
            drop(records);

            let mut roots = txn.open_table(ROOTS).map_err(StorageError::backend)?;
            for (slot, location) in pending.roots.iter().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                roots
                    .insert(slot as u8, location)
                    .map_err(StorageError::backend)?;
            }
            drop(roots);

            let mut meta = txn.open_table(META).map_err(StorageError::backend)?;
            meta.insert(NEXT_LOCATION_KEY, pending.next_location)
                .map_err(StorageError::backend)?;
        }
        txn.commit().map_err(StorageError::backend)?;

        debug!(
            name = self.name.as_str(),
            written = pending.writes.len(),
            "flushed disk storage manager"
        );

        // Committed writes become cache entries.
        let writes = std::mem::take(&mut pending.writes);
        for (location, write) in writes {
            if let Some(data) = write {
                pending.cache.insert(location, data);
            }
        }
        pending.roots_dirty = false;
        Ok(())
    }

    fn rollback(&self) -> Result<(), StorageError> {
        let mut pending = self.pending.lock();
        pending.writes.clear();
        pending.roots_dirty = false;

        // Re-read the committed anchor state.
        let txn = self.db.begin_read().map_err(StorageError::backend)?;
        let roots_table = txn.open_table(ROOTS).map_err(StorageError::backend)?;
        for slot in 0..MAX_ROOT_SLOTS {
            #[allow(clippy::cast_possible_truncation)]
            let stored = roots_table
                .get(slot as u8)
                .map_err(StorageError::backend)?;
            pending.roots[slot] = stored.map_or(NIL_LOCATION, |value| value.value());
        }
        let meta = txn.open_table(META).map_err(StorageError::backend)?;
        if let Some(value) = meta.get(NEXT_LOCATION_KEY).map_err(StorageError::backend)? {
            pending.next_location = value.value();
        }
        Ok(())
    }

    fn close(&self) -> Result<(), StorageError> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_fetch_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sm = DiskStorageManager::open("test", dir.path()).expect("open");

        let loc = sm.insert(b"payload".to_vec()).expect("insert");
        assert_eq!(sm.fetch(loc).expect("fetch"), b"payload");

        sm.update(loc, b"changed".to_vec()).expect("update");
        assert_eq!(sm.fetch(loc).expect("fetch"), b"changed");
    }

    #[test]
    fn flushed_state_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");

        let loc = {
            let sm = DiskStorageManager::open("test", dir.path()).expect("open");
            let loc = sm.insert(b"durable".to_vec()).expect("insert");
            sm.set_root(2, loc);
            sm.flush().expect("flush");
            loc
        };

        let sm = DiskStorageManager::open("test", dir.path()).expect("reopen");
        assert_eq!(sm.root(2), loc);
        assert_eq!(sm.fetch(loc).expect("fetch"), b"durable");
        // Fresh locations continue after the persisted counter.
        let next = sm.insert(Vec::new()).expect("insert");
        assert!(next > loc);
    }

    #[test]
    fn unflushed_writes_do_not_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");

        let loc = {
            let sm = DiskStorageManager::open("test", dir.path()).expect("open");
            sm.insert(b"ephemeral".to_vec()).expect("insert")
        };

        let sm = DiskStorageManager::open("test", dir.path()).expect("reopen");
        assert!(sm.fetch(loc).is_err());
    }

    #[test]
    fn rollback_discards_pending_writes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sm = DiskStorageManager::open("test", dir.path()).expect("open");

        let keep = sm.insert(b"keep".to_vec()).expect("insert");
        sm.set_root(1, keep);
        sm.flush().expect("flush");

        let drop_loc = sm.insert(b"drop".to_vec()).expect("insert");
        sm.update(keep, b"changed".to_vec()).expect("update");
        sm.set_root(1, drop_loc);
        sm.rollback().expect("rollback");

        assert_eq!(sm.fetch(keep).expect("fetch"), b"keep");
        assert_eq!(sm.root(1), keep);
        assert!(sm.fetch(drop_loc).is_err());
    }

    #[test]
    fn free_then_flush_removes_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sm = DiskStorageManager::open("test", dir.path()).expect("open");

        let loc = sm.insert(b"x".to_vec()).expect("insert");
        sm.flush().expect("flush");
        sm.free(loc).expect("free");
        assert!(sm.fetch(loc).is_err());
        sm.flush().expect("flush");
        assert!(sm.fetch(loc).is_err());
    }

    #[test]
    fn fetch_cached_serves_pending_and_cached_reads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sm = DiskStorageManager::open("test", dir.path()).expect("open");

        let loc = sm.insert(b"x".to_vec()).expect("insert");
        // Pending write is visible to the cache-only read.
        assert_eq!(sm.fetch_cached(loc).expect("cached"), Some(b"x".to_vec()));

        sm.flush().expect("flush");
        // Committed write stays cached after flush.
        assert_eq!(sm.fetch_cached(loc).expect("cached"), Some(b"x".to_vec()));
    }

    #[test]
    fn fetch_cached_misses_uncached_committed_record() {
        let dir = tempfile::tempdir().expect("tempdir");

        let loc = {
            let sm = DiskStorageManager::open("test", dir.path()).expect("open");
            let loc = sm.insert(b"cold".to_vec()).expect("insert");
            sm.flush().expect("flush");
            loc
        };

        let sm = DiskStorageManager::open("test", dir.path()).expect("reopen");
        // Never read since reopen: cache-only lookup misses without I/O.
        assert_eq!(sm.fetch_cached(loc).expect("cached"), None);
        // A direct fetch populates the cache.
        assert_eq!(sm.fetch(loc).expect("fetch"), b"cold");
        assert_eq!(sm.fetch_cached(loc).expect("cached"), Some(b"cold".to_vec()));
    }

    #[test]
    fn update_missing_record_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sm = DiskStorageManager::open("test", dir.path()).expect("open");
        assert!(matches!(
            sm.update(99, Vec::new()),
            Err(StorageError::NotFound { location: 99, .. })
        ));
    }
}
