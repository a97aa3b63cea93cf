//! Weak reference registry
//!
//! A growable table of weak slots under its own spin lock. Handles are slot
//! indices tagged with a generation: growth reallocates the table but never
//! moves a slot to another index, so handles held by other threads stay
//! valid across growth, and a released handle can be told apart from the
//! handle that later reuses its slot.

use crate::aux_alloc::{AuxBuffer, AuxZone};
use crate::spin_lock::SpinMutex;
use core_types::{Address, AuxError};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

const NIL: u32 = u32::MAX;
const MIN_CAPACITY: usize = 4;

/// Opaque handle to a registered weak reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeakHandle {
    index: u32,
    generation: u32,
}

impl WeakHandle {
    /// Slot index, stable for the handle's lifetime.
    pub fn index(self) -> u32 {
        self.index
    }
}

#[derive(Clone, Copy)]
struct WeakSlot {
    /// Referent address, null once cleared
    referent: usize,
    /// Bumped on release; issued handles carry the value at registration
    generation: u32,
    /// Next free slot while free, `NIL` while live
    next_free: u32,
    live: bool,
}

impl WeakSlot {
    const FREE: WeakSlot = WeakSlot {
        referent: 0,
        generation: 1,
        next_free: NIL,
        live: false,
    };
}

struct WeakTable {
    slots: AuxBuffer<WeakSlot>,
    free_head: u32,
    live: usize,
}

impl WeakTable {
    fn slot(&self, handle: WeakHandle) -> Option<usize> {
        let index = handle.index as usize;
        let slot = self.slots.get(index)?;
        (slot.live && slot.generation == handle.generation).then_some(index)
    }

    fn link_free(&mut self, from: usize, to: usize) {
        // Push in reverse so lower indices are handed out first
        for index in (from..to).rev() {
            self.slots[index].next_free = self.free_head;
            self.free_head = index as u32;
        }
    }

    fn grow(&mut self) -> Result<(), AuxError> {
        let old = self.slots.len();
        let new = (old * 2).max(MIN_CAPACITY);
        if new > NIL as usize {
            return Err(AuxError::InvalidLayout {
                count: new,
                size: std::mem::size_of::<WeakSlot>(),
            });
        }
        self.slots.resize(new, WeakSlot::FREE)?;
        self.link_free(old, new);
        debug!(
            target: "collector::weak",
            old_capacity = old,
            new_capacity = new,
            live = self.live,
            "weak table grown"
        );
        Ok(())
    }
}

/// The table of weak references for one zone.
///
/// # Examples
///
/// ```
/// use collector::{aux_alloc::aux_init, WeakRegistry};
/// use core_types::Address;
///
/// let registry = WeakRegistry::new(&aux_init(), 8).unwrap();
/// let handle = registry.register(Address::new(0x500)).unwrap();
/// assert_eq!(registry.resolve(handle), Some(Address::new(0x500)));
/// registry.clear(handle);
/// assert_eq!(registry.resolve(handle), None);
/// assert!(registry.unregister(handle));
/// ```
pub struct WeakRegistry {
    table: SpinMutex<WeakTable>,
}

impl WeakRegistry {
    /// Creates a registry with room for `capacity` entries before growing.
    pub fn new(zone: &Arc<AuxZone>, capacity: usize) -> Result<Self, AuxError> {
        let capacity = capacity.clamp(MIN_CAPACITY, NIL as usize);
        let mut table = WeakTable {
            slots: AuxBuffer::filled(zone, capacity, WeakSlot::FREE)?,
            free_head: NIL,
            live: 0,
        };
        table.link_free(0, capacity);
        Ok(WeakRegistry {
            table: SpinMutex::new(table),
        })
    }

    /// Registers a weak reference to `referent`.
    ///
    /// Doubles the table when it is full.
    pub fn register(&self, referent: Address) -> Result<WeakHandle, AuxError> {
        let mut table = self.table.lock();
        if table.free_head == NIL {
            table.grow()?;
        }
        let index = table.free_head as usize;
        let slot = &mut table.slots[index];
        let next = slot.next_free;
        slot.referent = referent.as_usize();
        slot.next_free = NIL;
        slot.live = true;
        let handle = WeakHandle {
            index: index as u32,
            generation: slot.generation,
        };
        table.free_head = next;
        table.live += 1;
        trace!(target: "collector::weak", index, %referent, "weak reference registered");
        Ok(handle)
    }

    /// Returns the referent, or `None` once cleared or released.
    pub fn resolve(&self, handle: WeakHandle) -> Option<Address> {
        let table = self.table.lock();
        let index = table.slot(handle)?;
        let referent = Address::new(table.slots[index].referent);
        (!referent.is_null()).then_some(referent)
    }

    /// Clears the referent. Returns true if this call cleared it.
    ///
    /// Clearing an already cleared or released handle does nothing.
    pub fn clear(&self, handle: WeakHandle) -> bool {
        let mut table = self.table.lock();
        let Some(index) = table.slot(handle) else {
            return false;
        };
        let slot = &mut table.slots[index];
        let was_set = slot.referent != 0;
        slot.referent = 0;
        was_set
    }

    /// Clears every entry that refers to `referent`. Returns how many.
    pub fn clear_if_referent(&self, referent: Address) -> usize {
        if referent.is_null() {
            return 0;
        }
        self.clear_matching(|addr| addr == referent)
    }

    /// Clears every entry whose referent `is_live` rejects. Returns how many.
    ///
    /// The tracer calls this once per pass with its liveness predicate.
    pub fn clear_unreachable(&self, mut is_live: impl FnMut(Address) -> bool) -> usize {
        self.clear_matching(|addr| !is_live(addr))
    }

    /// Releases the slot. Returns false for a handle already released.
    pub fn unregister(&self, handle: WeakHandle) -> bool {
        let mut table = self.table.lock();
        let Some(index) = table.slot(handle) else {
            return false;
        };
        let free_head = table.free_head;
        let slot = &mut table.slots[index];
        slot.referent = 0;
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1).max(1);
        slot.next_free = free_head;
        table.free_head = index as u32;
        table.live -= 1;
        true
    }

    /// Number of registered entries, cleared or not.
    pub fn len(&self) -> usize {
        self.table.lock().live
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots before the next growth.
    pub fn capacity(&self) -> usize {
        self.table.lock().slots.len()
    }

    fn clear_matching(&self, mut matches: impl FnMut(Address) -> bool) -> usize {
        let mut table = self.table.lock();
        let mut cleared = 0;
        for slot in table.slots.iter_mut() {
            if slot.live && slot.referent != 0 && matches(Address::new(slot.referent)) {
                slot.referent = 0;
                cleared += 1;
            }
        }
        cleared
    }
}

impl fmt::Debug for WeakRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("WeakRegistry")
            .field("len", &table.live)
            .field("capacity", &table.slots.len())
            .finish()
    }
}
