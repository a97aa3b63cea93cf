//! Auxiliary allocator for collector metadata
//!
//! Pointer tables and the weak-reference table are allocated from an
//! [`AuxZone`], never from the client heap. Collector bookkeeping therefore
//! is not itself visible as client heap content, and stays allocatable while
//! the client heap is in the middle of a collection.
//!
//! Each block carries a small header just below the returned pointer holding
//! the requested size and alignment, so `free` and `realloc` need only the
//! pointer, as with `malloc`.

use core_types::AuxError;
use once_cell::sync::OnceCell;
use std::alloc::{alloc, alloc_zeroed, dealloc, Layout};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Virtual memory page size assumed by [`AuxZone::valloc`].
pub const PAGE_SIZE: usize = 4096;

/// Bytes reserved below every block for its size and alignment.
const HEADER_SIZE: usize = 16;
/// Alignment of `malloc`/`calloc`/`realloc` blocks.
const MIN_ALIGN: usize = 16;

/// Rounds `size` up to a whole number of pages.
///
/// # Examples
///
/// ```
/// use collector::aux_alloc::{round_page, PAGE_SIZE};
///
/// assert_eq!(round_page(1), PAGE_SIZE);
/// assert_eq!(round_page(PAGE_SIZE), PAGE_SIZE);
/// assert_eq!(round_page(0), 0);
/// ```
pub fn round_page(size: usize) -> usize {
    size.saturating_add(PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// A private allocation arena for collector metadata.
#[derive(Debug)]
pub struct AuxZone {
    /// Maximum bytes handed out at once, if bounded
    limit: Option<usize>,
    /// Bytes currently handed out (excluding headers)
    in_use: AtomicUsize,
    /// Total successful allocations
    allocations: AtomicU64,
    /// Total frees
    frees: AtomicU64,
}

static AUX_ZONE: OnceCell<Arc<AuxZone>> = OnceCell::new();

/// Initializes the process-wide auxiliary zone and returns it.
///
/// Safe to call repeatedly; only the first call creates the zone.
pub fn aux_init() -> Arc<AuxZone> {
    AUX_ZONE
        .get_or_init(|| {
            debug!(target: "collector::aux", "auxiliary zone initialized");
            Arc::new(AuxZone::new())
        })
        .clone()
}

impl AuxZone {
    /// Creates an unbounded zone.
    pub fn new() -> Self {
        AuxZone {
            limit: None,
            in_use: AtomicUsize::new(0),
            allocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
        }
    }

    /// Creates a zone that refuses to hand out more than `limit` bytes at once.
    pub fn with_limit(limit: usize) -> Self {
        AuxZone {
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// Allocates `size` uninitialized bytes.
    pub fn malloc(&self, size: usize) -> Result<NonNull<u8>, AuxError> {
        self.allocate(size, MIN_ALIGN, false)
    }

    /// Allocates zeroed storage for `count` elements of `size` bytes.
    pub fn calloc(&self, count: usize, size: usize) -> Result<NonNull<u8>, AuxError> {
        let bytes = count
            .checked_mul(size)
            .ok_or(AuxError::InvalidLayout { count, size })?;
        self.allocate(bytes, MIN_ALIGN, true)
    }

    /// Allocates page-aligned storage rounded up to whole pages.
    pub fn valloc(&self, size: usize) -> Result<NonNull<u8>, AuxError> {
        if size > usize::MAX - PAGE_SIZE {
            return Err(AuxError::InvalidLayout { count: 1, size });
        }
        self.allocate(round_page(size), PAGE_SIZE, false)
    }

    /// Resizes a block, preserving its contents up to the smaller size.
    ///
    /// `None` behaves like `malloc`. On failure the original block is left
    /// untouched and still owned by the caller.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by this zone and not yet freed.
    pub unsafe fn realloc(
        &self,
        block: Option<NonNull<u8>>,
        new_size: usize,
    ) -> Result<NonNull<u8>, AuxError> {
        let Some(old) = block else {
            return self.malloc(new_size);
        };
        let (old_size, align) = read_header(old);
        let new = self.allocate(new_size, align, false)?;
        ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), old_size.min(new_size));
        self.free(old);
        Ok(new)
    }

    /// Returns a block to the zone.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by this zone and not yet freed.
    pub unsafe fn free(&self, block: NonNull<u8>) {
        let (size, align) = read_header(block);
        let offset = align.max(HEADER_SIZE);
        let base = block.as_ptr().sub(offset);
        dealloc(base, Layout::from_size_align_unchecked(size + offset, align));
        self.in_use.fetch_sub(size, Ordering::AcqRel);
        self.frees.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the usable size of a block.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by this zone and not yet freed.
    pub unsafe fn block_size(&self, block: NonNull<u8>) -> usize {
        read_header(block).0
    }

    /// Bytes currently handed out.
    pub fn bytes_in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Total number of successful allocations.
    pub fn allocation_count(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of blocks not yet freed.
    pub fn live_blocks(&self) -> u64 {
        self.allocations
            .load(Ordering::Relaxed)
            .saturating_sub(self.frees.load(Ordering::Relaxed))
    }

    fn reserve(&self, size: usize) -> Result<(), AuxError> {
        let Some(limit) = self.limit else {
            self.in_use.fetch_add(size, Ordering::AcqRel);
            return Ok(());
        };
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |in_use| {
                in_use.checked_add(size).filter(|&total| total <= limit)
            })
            .map(|_| ())
            .map_err(|in_use| AuxError::Exhausted {
                requested: size,
                in_use,
            })
    }

    fn allocate(&self, size: usize, align: usize, zeroed: bool) -> Result<NonNull<u8>, AuxError> {
        let offset = align.max(HEADER_SIZE);
        let layout = size
            .checked_add(offset)
            .and_then(|total| Layout::from_size_align(total, align).ok())
            .ok_or(AuxError::InvalidLayout { count: 1, size })?;

        self.reserve(size)?;

        // SAFETY: layout has a non-zero size (offset > 0).
        let base = unsafe {
            if zeroed {
                alloc_zeroed(layout)
            } else {
                alloc(layout)
            }
        };
        let Some(base) = NonNull::new(base) else {
            let in_use = self.in_use.fetch_sub(size, Ordering::AcqRel) - size;
            return Err(AuxError::Exhausted {
                requested: size,
                in_use,
            });
        };

        // SAFETY: offset < layout.size(), and the header slot is 16-byte
        // aligned because offset is a multiple of 16 and base is aligned.
        unsafe {
            let block = base.as_ptr().add(offset);
            let header = block.sub(HEADER_SIZE) as *mut [usize; 2];
            header.write([size, align]);
            self.allocations.fetch_add(1, Ordering::Relaxed);
            Ok(NonNull::new_unchecked(block))
        }
    }
}

impl Default for AuxZone {
    fn default() -> Self {
        Self::new()
    }
}

unsafe fn read_header(block: NonNull<u8>) -> (usize, usize) {
    let header = block.as_ptr().sub(HEADER_SIZE) as *const [usize; 2];
    let [size, align] = header.read();
    (size, align)
}

/// Types whose all-zero bit pattern is a valid value.
///
/// # Safety
///
/// Implementors must be valid when every byte is zero.
pub(crate) unsafe trait ZeroInit: Copy {}

unsafe impl ZeroInit for usize {}

/// A fixed-length array of `T` stored in an [`AuxZone`].
pub struct AuxBuffer<T: Copy> {
    ptr: NonNull<T>,
    len: usize,
    zone: Arc<AuxZone>,
}

// SAFETY: the buffer uniquely owns its storage.
unsafe impl<T: Copy + Send> Send for AuxBuffer<T> {}
unsafe impl<T: Copy + Sync> Sync for AuxBuffer<T> {}

impl<T: Copy> AuxBuffer<T> {
    /// Allocates `len` elements, each set to `value`.
    pub fn filled(zone: &Arc<AuxZone>, len: usize, value: T) -> Result<Self, AuxError> {
        debug_assert!(mem::align_of::<T>() <= MIN_ALIGN);
        let bytes = Self::byte_len(len)?;
        let ptr = zone.malloc(bytes)?.cast::<T>();
        for i in 0..len {
            // SAFETY: i < len and the block holds len elements.
            unsafe { ptr.as_ptr().add(i).write(value) };
        }
        Ok(AuxBuffer {
            ptr,
            len,
            zone: Arc::clone(zone),
        })
    }

    /// Allocates `len` zeroed elements.
    pub(crate) fn zeroed(zone: &Arc<AuxZone>, len: usize) -> Result<Self, AuxError>
    where
        T: ZeroInit,
    {
        debug_assert!(mem::align_of::<T>() <= MIN_ALIGN);
        let ptr = zone.calloc(len, mem::size_of::<T>().max(1))?.cast::<T>();
        Ok(AuxBuffer {
            ptr,
            len,
            zone: Arc::clone(zone),
        })
    }

    /// Changes the length, filling new elements with `fill`.
    ///
    /// Existing elements keep their values and indices. On failure the
    /// buffer is unchanged.
    pub fn resize(&mut self, new_len: usize, fill: T) -> Result<(), AuxError> {
        let bytes = Self::byte_len(new_len)?;
        // SAFETY: self.ptr came from self.zone and is live.
        let ptr = unsafe { self.zone.realloc(Some(self.ptr.cast()), bytes)? }.cast::<T>();
        for i in self.len..new_len {
            // SAFETY: i < new_len.
            unsafe { ptr.as_ptr().add(i).write(fill) };
        }
        self.ptr = ptr;
        self.len = new_len;
        Ok(())
    }

    /// The zone this buffer lives in.
    pub fn zone(&self) -> &Arc<AuxZone> {
        &self.zone
    }

    fn byte_len(len: usize) -> Result<usize, AuxError> {
        let size = mem::size_of::<T>();
        len.checked_mul(size)
            .ok_or(AuxError::InvalidLayout { count: len, size })
    }
}

impl<T: Copy> Deref for AuxBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        // SAFETY: ptr holds len initialized elements.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Copy> DerefMut for AuxBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: ptr holds len initialized elements, uniquely owned.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Copy> Drop for AuxBuffer<T> {
    fn drop(&mut self) {
        // SAFETY: ptr came from zone and is freed exactly once.
        unsafe { self.zone.free(self.ptr.cast()) };
    }
}
