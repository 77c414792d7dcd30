//! MainDb: the singleton metadata namespace of a graph storage.
//!
//! A small string-keyed map persisted as one MessagePack record inside
//! the `main` storage manager, anchored at a reserved root slot. All
//! writes stay in memory until `flush` serializes the map back; a
//! `rollback` re-reads the last flushed record. Counters, kind lists,
//! attribute lists, and the names manager's interning tables all live
//! here (see [`crate::keys`] for the key namespace).

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_bytes::ByteBuf;

use lattice_core::storage::{StorageManager, NIL_LOCATION};

use crate::error::{GraphError, GraphResult};

/// Root slot anchoring the MainDb record in its storage manager.
pub const ROOT_SLOT_MAIN_DB: usize = 1;

type Entries = BTreeMap<String, ByteBuf>;

/// The metadata key/value namespace of one graph storage.
pub struct MainDb {
    sm: Arc<dyn StorageManager>,
    location: u64,
    entries: Mutex<Entries>,
}

impl MainDb {
    /// Opens (or initializes) the MainDb inside the given manager.
    pub fn open(sm: Arc<dyn StorageManager>) -> GraphResult<Self> {
        let mut location = sm.root(ROOT_SLOT_MAIN_DB);
        let entries = if location == NIL_LOCATION {
            let entries = Entries::new();
            let data = rmp_serde::to_vec(&entries).map_err(GraphError::writing)?;
            location = sm.insert(data).map_err(GraphError::writing)?;
            sm.set_root(ROOT_SLOT_MAIN_DB, location);
            sm.flush().map_err(|err| GraphError::Flushing(err.to_string()))?;
            entries
        } else {
            let data = sm.fetch(location).map_err(GraphError::reading)?;
            rmp_serde::from_slice(&data).map_err(GraphError::reading)?
        };
        Ok(Self {
            sm,
            location,
            entries: Mutex::new(entries),
        })
    }

    /// Returns the raw value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(key).map(|buf| buf.to_vec())
    }

    /// Stores a raw value under `key` (durable at the next flush).
    pub fn put(&self, key: &str, value: Vec<u8>) {
        self.entries
            .lock()
            .insert(key.to_string(), ByteBuf::from(value));
    }

    /// Reads a string set; missing keys yield an empty set.
    #[must_use]
    pub fn get_string_set(&self, key: &str) -> std::collections::BTreeSet<String> {
        self.get(key)
            .and_then(|data| rmp_serde::from_slice(&data).ok())
            .unwrap_or_default()
    }

    /// Adds a member to a string set, reporting whether it was new.
    pub fn add_to_string_set(&self, key: &str, member: &str) -> GraphResult<bool> {
        let mut set = self.get_string_set(key);
        if !set.insert(member.to_string()) {
            return Ok(false);
        }
        let data = rmp_serde::to_vec(&set).map_err(GraphError::writing)?;
        self.put(key, data);
        Ok(true)
    }

    /// Reads a counter; missing keys yield zero.
    #[must_use]
    pub fn get_counter(&self, key: &str) -> u64 {
        self.get(key)
            .and_then(|data| data.try_into().ok())
            .map_or(0, u64::from_le_bytes)
    }

    /// Stores a counter as little-endian bytes.
    pub fn set_counter(&self, key: &str, value: u64) {
        self.put(key, value.to_le_bytes().to_vec());
    }

    /// Serializes the map and makes it durable.
    pub fn flush(&self) -> GraphResult<()> {
        let data = {
            let entries = self.entries.lock();
            rmp_serde::to_vec(&*entries).map_err(GraphError::writing)?
        };
        self.sm
            .update(self.location, data)
            .map_err(|err| GraphError::Flushing(err.to_string()))?;
        self.sm
            .flush()
            .map_err(|err| GraphError::Flushing(err.to_string()))
    }

    /// Discards in-memory changes, restoring the last flushed map.
    pub fn rollback(&self) -> GraphResult<()> {
        self.sm
            .rollback()
            .map_err(|err| GraphError::Rollback(err.to_string()))?;
        let data = self
            .sm
            .fetch(self.location)
            .map_err(|err| GraphError::Rollback(err.to_string()))?;
        let entries: Entries =
            rmp_serde::from_slice(&data).map_err(|err| GraphError::Rollback(err.to_string()))?;
        *self.entries.lock() = entries;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lattice_core::storage::MemoryStorageManager;

    use super::*;

    fn make_main_db() -> (Arc<MemoryStorageManager>, MainDb) {
        let sm = Arc::new(MemoryStorageManager::new("main"));
        let db = MainDb::open(Arc::clone(&sm) as Arc<dyn StorageManager>).expect("open");
        (sm, db)
    }

    #[test]
    fn put_get_round_trip() {
        let (_, db) = make_main_db();
        assert_eq!(db.get("missing"), None);

        db.put("key", b"value".to_vec());
        assert_eq!(db.get("key"), Some(b"value".to_vec()));
    }

    #[test]
    fn reopen_restores_flushed_entries() {
        let sm = Arc::new(MemoryStorageManager::new("main"));
        {
            let db = MainDb::open(Arc::clone(&sm) as Arc<dyn StorageManager>).expect("open");
            db.put("key", b"value".to_vec());
            db.flush().expect("flush");
        }
        let db = MainDb::open(sm as Arc<dyn StorageManager>).expect("reopen");
        assert_eq!(db.get("key"), Some(b"value".to_vec()));
    }

    #[test]
    fn rollback_restores_flushed_entries() {
        let (_, db) = make_main_db();
        db.put("stable", b"1".to_vec());
        db.flush().expect("flush");

        db.put("stable", b"2".to_vec());
        db.put("volatile", b"x".to_vec());
        db.rollback().expect("rollback");

        assert_eq!(db.get("stable"), Some(b"1".to_vec()));
        assert_eq!(db.get("volatile"), None);
    }

    #[test]
    fn string_sets_are_additive_and_sorted() {
        let (_, db) = make_main_db();
        assert!(db.add_to_string_set("set", "b").expect("add"));
        assert!(db.add_to_string_set("set", "a").expect("add"));
        assert!(!db.add_to_string_set("set", "a").expect("re-add"));

        let members: Vec<String> = db.get_string_set("set").into_iter().collect();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn counters_default_to_zero() {
        let (_, db) = make_main_db();
        assert_eq!(db.get_counter("cnt"), 0);

        db.set_counter("cnt", 42);
        assert_eq!(db.get_counter("cnt"), 42);
    }

    #[test]
    fn flush_failure_is_a_flushing_error() {
        let (sm, db) = make_main_db();
        sm.set_fail_flush(true);
        let err = db.flush().expect_err("must fail");
        assert!(matches!(err, GraphError::Flushing(_)));
    }
}
