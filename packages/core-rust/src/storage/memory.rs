//! In-memory [`StorageManager`] implementation.
//!
//! Keeps records in a `HashMap` alongside a snapshot of the last flushed
//! state, so `rollback` can restore it. A fault-injection table maps
//! record locations to the operation that should fail on them; flush and
//! rollback failures can be toggled separately. The injection facilities
//! exist purely so tests can exercise the engine's error paths.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{AccessOp, StorageError};
use crate::storage::{StorageManager, MAX_ROOT_SLOTS, NIL_LOCATION};

/// Mutable state of the manager: live view plus the last flushed snapshot.
#[derive(Debug, Clone, Default)]
struct State {
    records: HashMap<u64, Vec<u8>>,
    roots: [u64; MAX_ROOT_SLOTS],
    next_location: u64,
}

struct Inner {
    live: State,
    flushed: State,
    faults: HashMap<u64, AccessOp>,
    fail_flush: bool,
    fail_rollback: bool,
}

/// `HashMap`-backed storage manager for development and testing.
///
/// The whole map doubles as the cache, so `fetch_cached` always hits.
pub struct MemoryStorageManager {
    name: String,
    inner: Mutex<Inner>,
}

impl MemoryStorageManager {
    /// Creates a new, empty manager with the given name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let state = State {
            records: HashMap::new(),
            roots: [NIL_LOCATION; MAX_ROOT_SLOTS],
            next_location: 1,
        };
        Self {
            name: name.to_string(),
            inner: Mutex::new(Inner {
                live: state.clone(),
                flushed: state,
                faults: HashMap::new(),
                fail_flush: false,
                fail_rollback: false,
            }),
        }
    }

    /// Registers a fault for a location: the given operation on it fails
    /// with [`StorageError::Injected`] until the fault is cleared.
    pub fn inject_fault(&self, location: u64, op: AccessOp) {
        self.inner.lock().faults.insert(location, op);
    }

    /// Clears every registered fault.
    pub fn clear_faults(&self) {
        let mut inner = self.inner.lock();
        inner.faults.clear();
        inner.fail_flush = false;
        inner.fail_rollback = false;
    }

    /// Makes the next and all following `flush` calls fail.
    pub fn set_fail_flush(&self, fail: bool) {
        self.inner.lock().fail_flush = fail;
    }

    /// Makes the next and all following `rollback` calls fail.
    pub fn set_fail_rollback(&self, fail: bool) {
        self.inner.lock().fail_rollback = fail;
    }

    fn check_fault(
        inner: &Inner,
        location: u64,
        op: AccessOp,
    ) -> Result<(), StorageError> {
        if inner.faults.get(&location) == Some(&op) {
            return Err(StorageError::Injected { op, location });
        }
        Ok(())
    }
}

impl StorageManager for MemoryStorageManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert(&self, data: Vec<u8>) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock();
        let location = inner.live.next_location;
        inner.live.next_location += 1;
        inner.live.records.insert(location, data);
        Ok(location)
    }

    fn update(&self, location: u64, data: Vec<u8>) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        Self::check_fault(&inner, location, AccessOp::Update)?;
        if !inner.live.records.contains_key(&location) {
            return Err(StorageError::NotFound {
                manager: self.name.clone(),
                location,
            });
        }
        inner.live.records.insert(location, data);
        Ok(())
    }

    fn free(&self, location: u64) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        Self::check_fault(&inner, location, AccessOp::Free)?;
        if inner.live.records.remove(&location).is_none() {
            return Err(StorageError::NotFound {
                manager: self.name.clone(),
                location,
            });
        }
        Ok(())
    }

    fn fetch(&self, location: u64) -> Result<Vec<u8>, StorageError> {
        let inner = self.inner.lock();
        Self::check_fault(&inner, location, AccessOp::Fetch)?;
        inner
            .live
            .records
            .get(&location)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                manager: self.name.clone(),
                location,
            })
    }

    fn fetch_cached(&self, location: u64) -> Result<Option<Vec<u8>>, StorageError> {
        let inner = self.inner.lock();
        Self::check_fault(&inner, location, AccessOp::FetchCached)?;
        Ok(inner.live.records.get(&location).cloned())
    }

    fn root(&self, slot: usize) -> u64 {
        assert!(slot < MAX_ROOT_SLOTS, "root slot {slot} out of range");
        self.inner.lock().live.roots[slot]
    }

    fn set_root(&self, slot: usize, location: u64) {
        assert!(slot < MAX_ROOT_SLOTS, "root slot {slot} out of range");
        self.inner.lock().live.roots[slot] = location;
    }

    fn flush(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.fail_flush {
            return Err(StorageError::Backend(format!(
                "injected flush failure in {}",
                self.name
            )));
        }
        inner.flushed = inner.live.clone();
        Ok(())
    }

    fn rollback(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if inner.fail_rollback {
            return Err(StorageError::Backend(format!(
                "injected rollback failure in {}",
                self.name
            )));
        }
        inner.live = inner.flushed.clone();
        Ok(())
    }

    fn close(&self) -> Result<(), StorageError> {
        self.flush()
    }
}
