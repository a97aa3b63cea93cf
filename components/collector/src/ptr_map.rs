//! Concurrent map from raw addresses to machine words
//!
//! Lookups return `Option<usize>`, so a stored zero is distinguishable from
//! an absent key.

use crate::aux_alloc::AuxZone;
use crate::ptr_table::{is_trackable, PtrTable};
use crate::spin_lock::{SpinMutex, SpinMutexGuard};
use core_types::{Address, AuxError};
use std::fmt;
use std::sync::Arc;

/// An unordered map with unique address keys.
///
/// The null address and the all-ones address (`usize::MAX`) are reserved
/// as table sentinels and can never be keys.
///
/// # Examples
///
/// ```
/// use collector::{aux_alloc::aux_init, PtrMap};
/// use core_types::Address;
///
/// let map = PtrMap::new(&aux_init()).unwrap();
/// let key = Address::new(0x2000);
/// assert_eq!(map.set(key, 0).unwrap(), None);
/// assert_eq!(map.get(key), Some(0));
/// assert_eq!(map.remove(key), Some(0));
/// assert_eq!(map.get(key), None);
/// ```
pub struct PtrMap {
    table: SpinMutex<PtrTable>,
}

impl PtrMap {
    /// Creates an empty map backed by `zone`.
    pub fn new(zone: &Arc<AuxZone>) -> Result<Self, AuxError> {
        Self::with_capacity(zone, 0)
    }

    /// Creates an empty map with room for about `capacity` entries.
    pub fn with_capacity(zone: &Arc<AuxZone>, capacity: usize) -> Result<Self, AuxError> {
        Ok(PtrMap {
            table: SpinMutex::new(PtrTable::new(zone, capacity, true)?),
        })
    }

    /// Stores `value` under `key`, returning the value it replaced.
    ///
    /// Null and all-ones keys are ignored.
    pub fn set(&self, key: Address, value: usize) -> Result<Option<usize>, AuxError> {
        self.lock().set(key, value)
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: Address) -> Option<usize> {
        self.lock().get(key)
    }

    /// Returns true if `key` has a value.
    pub fn contains(&self, key: Address) -> bool {
        self.lock().contains(key)
    }

    /// Deletes `key`, returning its value.
    pub fn remove(&self, key: Address) -> Option<usize> {
        self.lock().remove(key)
    }

    /// Acquires the map's lock for a batch of operations.
    pub fn lock(&self) -> PtrMapGuard<'_> {
        PtrMapGuard {
            table: self.table.lock(),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Returns true if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PtrMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PtrMap").field("len", &self.len()).finish()
    }
}

/// Exclusive access to a [`PtrMap`] while the guard lives.
pub struct PtrMapGuard<'a> {
    table: SpinMutexGuard<'a, PtrTable>,
}

impl PtrMapGuard<'_> {
    /// Stores `value` under `key`, returning the value it replaced.
    ///
    /// Null and all-ones keys are ignored.
    pub fn set(&mut self, key: Address, value: usize) -> Result<Option<usize>, AuxError> {
        if !is_trackable(key) {
            return Ok(None);
        }
        self.table.insert(key, value)
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: Address) -> Option<usize> {
        self.table.get(key)
    }

    /// Returns true if `key` has a value.
    pub fn contains(&self, key: Address) -> bool {
        self.table.contains(key)
    }

    /// Deletes `key`, returning its value.
    pub fn remove(&mut self, key: Address) -> Option<usize> {
        self.table.remove(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Visits every entry.
    pub fn for_each(&self, f: impl FnMut(Address, usize)) {
        self.table.for_each(f);
    }
}
