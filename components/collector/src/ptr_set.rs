//! Concurrent set of raw addresses
//!
//! Backs allocation and liveness tracking. Every operation is available in
//! two forms: on the set itself, which takes the set's own lock for the call,
//! and on a [`PtrSetGuard`], which lets a caller such as the tracer hold the
//! lock across a batch of operations without locking recursively.

use crate::aux_alloc::AuxZone;
use crate::ptr_table::{is_trackable, PtrTable};
use crate::spin_lock::{SpinMutex, SpinMutexGuard};
use core_types::{Address, AuxError};
use std::fmt;
use std::sync::Arc;

/// An unordered set of unique addresses.
///
/// The null address and the all-ones address (`usize::MAX`) are reserved
/// as table sentinels and are never members.
///
/// # Examples
///
/// ```
/// use collector::{aux_alloc::aux_init, PtrSet};
/// use core_types::Address;
///
/// let set = PtrSet::new(&aux_init()).unwrap();
/// let p = Address::new(0x1000);
/// assert!(set.add(p).unwrap());
/// assert!(set.is_member(p));
/// assert!(set.remove(p));
/// assert!(!set.is_member(p));
/// ```
pub struct PtrSet {
    table: SpinMutex<PtrTable>,
}

impl PtrSet {
    /// Creates an empty set backed by `zone`.
    pub fn new(zone: &Arc<AuxZone>) -> Result<Self, AuxError> {
        Self::with_capacity(zone, 0)
    }

    /// Creates an empty set with room for about `capacity` addresses.
    pub fn with_capacity(zone: &Arc<AuxZone>, capacity: usize) -> Result<Self, AuxError> {
        Ok(PtrSet {
            table: SpinMutex::new(PtrTable::new(zone, capacity, false)?),
        })
    }

    /// Adds `ptr`. Returns true if it was not already a member.
    ///
    /// Null and all-ones addresses are ignored and reported as not added.
    pub fn add(&self, ptr: Address) -> Result<bool, AuxError> {
        self.lock().add(ptr)
    }

    /// Removes `ptr`. Returns true if it was a member.
    pub fn remove(&self, ptr: Address) -> bool {
        self.lock().remove(ptr)
    }

    /// Membership test that takes the set's lock.
    pub fn is_member(&self, ptr: Address) -> bool {
        let guard = self.lock();
        self.is_member_no_lock(&guard, ptr)
    }

    /// Membership test for a caller already holding this set's lock.
    ///
    /// Same predicate as [`is_member`](Self::is_member). The guard proves the
    /// lock is held and must come from this set.
    pub fn is_member_no_lock(&self, held: &PtrSetGuard<'_>, ptr: Address) -> bool {
        assert!(
            std::ptr::eq(held.set, self),
            "guard belongs to a different pointer set"
        );
        held.contains(ptr)
    }

    /// Acquires the set's lock for a batch of operations.
    pub fn lock(&self) -> PtrSetGuard<'_> {
        PtrSetGuard {
            set: self,
            table: self.table.lock(),
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    /// Returns true if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collects the members in unspecified order.
    pub fn to_vec(&self) -> Vec<Address> {
        let guard = self.lock();
        let mut members = Vec::with_capacity(guard.len());
        guard.for_each(|ptr| members.push(ptr));
        members
    }
}

impl fmt::Debug for PtrSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PtrSet").field("len", &self.len()).finish()
    }
}

/// Exclusive access to a [`PtrSet`] while the guard lives.
pub struct PtrSetGuard<'a> {
    set: &'a PtrSet,
    table: SpinMutexGuard<'a, PtrTable>,
}

impl PtrSetGuard<'_> {
    /// Adds `ptr`. Returns true if it was not already a member.
    ///
    /// Null and all-ones addresses are ignored and reported as not added.
    pub fn add(&mut self, ptr: Address) -> Result<bool, AuxError> {
        if !is_trackable(ptr) {
            return Ok(false);
        }
        Ok(self.table.insert(ptr, 0)?.is_none())
    }

    /// Removes `ptr`. Returns true if it was a member.
    pub fn remove(&mut self, ptr: Address) -> bool {
        self.table.remove(ptr).is_some()
    }

    /// Returns true if `ptr` is a member.
    pub fn contains(&self, ptr: Address) -> bool {
        self.table.contains(ptr)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Visits every member.
    pub fn for_each(&self, mut f: impl FnMut(Address)) {
        self.table.for_each(|ptr, _| f(ptr));
    }

    /// Removes every member.
    pub fn clear(&mut self) {
        self.table.clear();
    }
}
