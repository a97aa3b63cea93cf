//! Open-addressing address table shared by `PtrSet` and `PtrMap`.
//!
//! Keys are raw addresses. Slot value 0 marks an empty slot and `usize::MAX`
//! a deleted one, so neither can be stored. Capacity is a power of two and
//! doubles once live plus deleted slots pass three quarters.

use crate::aux_alloc::{AuxBuffer, AuxZone};
use core_types::{Address, AuxError};
use std::sync::Arc;

const EMPTY: usize = 0;
const TOMBSTONE: usize = usize::MAX;
const MIN_CAPACITY: usize = 16;

pub(crate) struct PtrTable {
    keys: AuxBuffer<usize>,
    values: Option<AuxBuffer<usize>>,
    live: usize,
    tombstones: usize,
}

/// Returns true for addresses a table can hold.
pub(crate) fn is_trackable(addr: Address) -> bool {
    let raw = addr.as_usize();
    raw != EMPTY && raw != TOMBSTONE
}

impl PtrTable {
    pub(crate) fn new(
        zone: &Arc<AuxZone>,
        capacity: usize,
        with_values: bool,
    ) -> Result<Self, AuxError> {
        let capacity = capacity.max(MIN_CAPACITY).next_power_of_two();
        let keys = AuxBuffer::zeroed(zone, capacity)?;
        let values = if with_values {
            Some(AuxBuffer::zeroed(zone, capacity)?)
        } else {
            None
        };
        Ok(PtrTable {
            keys,
            values,
            live: 0,
            tombstones: 0,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn capacity(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn contains(&self, key: Address) -> bool {
        self.find(key.as_usize()).is_some()
    }

    pub(crate) fn get(&self, key: Address) -> Option<usize> {
        let slot = self.find(key.as_usize())?;
        Some(self.values.as_ref().map_or(0, |values| values[slot]))
    }

    /// Inserts or overwrites `key`, returning the previous value.
    ///
    /// For a table without values the previous value is always 0.
    pub(crate) fn insert(&mut self, key: Address, value: usize) -> Result<Option<usize>, AuxError> {
        debug_assert!(is_trackable(key));
        let raw = key.as_usize();
        if let Some(slot) = self.find(raw) {
            let previous = self.values.as_mut().map_or(0, |values| {
                std::mem::replace(&mut values[slot], value)
            });
            return Ok(Some(previous));
        }

        if (self.live + self.tombstones + 1) * 4 > self.capacity() * 3 {
            self.rehash()?;
        }

        let slot = self.free_slot(raw);
        if self.keys[slot] == TOMBSTONE {
            self.tombstones -= 1;
        }
        self.keys[slot] = raw;
        if let Some(values) = self.values.as_mut() {
            values[slot] = value;
        }
        self.live += 1;
        Ok(None)
    }

    /// Removes `key`, returning its value.
    pub(crate) fn remove(&mut self, key: Address) -> Option<usize> {
        let slot = self.find(key.as_usize())?;
        self.keys[slot] = TOMBSTONE;
        self.live -= 1;
        self.tombstones += 1;
        Some(self.values.as_ref().map_or(0, |values| values[slot]))
    }

    pub(crate) fn for_each(&self, mut f: impl FnMut(Address, usize)) {
        for (slot, &raw) in self.keys.iter().enumerate() {
            if raw != EMPTY && raw != TOMBSTONE {
                let value = self.values.as_ref().map_or(0, |values| values[slot]);
                f(Address::new(raw), value);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.keys.fill(EMPTY);
        self.live = 0;
        self.tombstones = 0;
    }

    fn mask(&self) -> usize {
        self.capacity() - 1
    }

    fn home(&self, raw: usize) -> usize {
        // Fibonacci hashing; low bits of heap addresses are mostly alignment
        let hash = (raw as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32;
        hash as usize & self.mask()
    }

    fn find(&self, raw: usize) -> Option<usize> {
        if raw == EMPTY || raw == TOMBSTONE {
            return None;
        }
        let mask = self.mask();
        let mut slot = self.home(raw);
        for _ in 0..self.capacity() {
            match self.keys[slot] {
                EMPTY => return None,
                k if k == raw => return Some(slot),
                _ => slot = (slot + 1) & mask,
            }
        }
        None
    }

    fn free_slot(&self, raw: usize) -> usize {
        let mask = self.mask();
        let mut slot = self.home(raw);
        while self.keys[slot] != EMPTY && self.keys[slot] != TOMBSTONE {
            slot = (slot + 1) & mask;
        }
        slot
    }

    fn rehash(&mut self) -> Result<(), AuxError> {
        let capacity = if (self.live + 1) * 2 > self.capacity() {
            self.capacity() * 2
        } else {
            self.capacity()
        };
        let zone = Arc::clone(self.keys.zone());
        let mut next = PtrTable::new(&zone, capacity, self.values.is_some())?;
        self.for_each(|key, value| {
            let slot = next.free_slot(key.as_usize());
            next.keys[slot] = key.as_usize();
            if let Some(values) = next.values.as_mut() {
                values[slot] = value;
            }
            next.live += 1;
        });
        *self = next;
        Ok(())
    }
}
