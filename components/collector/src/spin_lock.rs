//! Fork-safe spin lock
//!
//! Every lock in the collector is a [`SpinLock`]. The lock is a single atomic
//! word and never records which thread holds it, so it stays usable in the
//! child of a `fork()` where only the forking thread survives: a child can
//! never deadlock on a per-thread OS handle that no longer exists.
//!
//! Real synchronization is gated by a process-wide "is threaded" flag. When a
//! process asserts it is single-threaded, locking degrades to plain loads and
//! stores with no atomic read-modify-write instructions.

use crossbeam::utils::Backoff;
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

static IS_THREADED: AtomicBool = AtomicBool::new(true);

/// Returns whether locks perform real synchronization.
pub fn is_threaded() -> bool {
    IS_THREADED.load(Ordering::Acquire)
}

/// Switches locks to real synchronization.
///
/// Called before the dedicated collection thread is spawned. Idempotent.
pub fn mark_threaded() {
    IS_THREADED.store(true, Ordering::Release);
}

/// Switches locks to single-threaded mode.
///
/// # Safety
///
/// No other thread may exist in the process, and no [`SpinLock`] may be
/// held, until [`mark_threaded`] is called again.
pub unsafe fn assume_single_threaded() {
    IS_THREADED.store(false, Ordering::Release);
}

/// A busy-waiting mutual exclusion lock.
///
/// `lock` spins with exponential backoff until it observes the lock free and
/// claims it. No priority inheritance and no kernel wait queue are involved.
///
/// In single-threaded mode `lock` and `unlock` succeed immediately, but
/// `try_lock` still fails on a lock the one running thread already holds,
/// so a [`SpinMutex`] never hands out a second guard.
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// Creates an unlocked spin lock.
    pub const fn new() -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
        }
    }

    /// Acquires the lock, spinning until it is free.
    pub fn lock(&self) {
        if !is_threaded() {
            debug_assert!(
                !self.locked.load(Ordering::Relaxed),
                "recursive spin lock acquisition"
            );
            self.locked.store(true, Ordering::Relaxed);
            return;
        }

        let backoff = Backoff::new();
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            // Spin on a plain load so contended waiters don't bounce the cache line
            while self.locked.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    /// Acquires the lock only if it is free right now.
    ///
    /// In single-threaded mode this succeeds unless the one running thread
    /// already holds the lock.
    pub fn try_lock(&self) -> bool {
        if !is_threaded() {
            if self.locked.load(Ordering::Relaxed) {
                return false;
            }
            self.locked.store(true, Ordering::Relaxed);
            return true;
        }
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases the lock.
    ///
    /// Must only be called by the holder.
    pub fn unlock(&self) {
        debug_assert!(self.locked.load(Ordering::Relaxed), "unlock of a free spin lock");
        self.locked.store(false, Ordering::Release);
    }

    /// Returns true if some thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Releases the lock regardless of holder.
    ///
    /// Intended for a `fork()` child handler that took every collector lock
    /// in the parent before forking.
    ///
    /// # Safety
    ///
    /// No live thread may be inside the critical section.
    pub unsafe fn force_unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Data protected by a [`SpinLock`].
///
/// The inner lock is private: only dropping a [`SpinMutexGuard`] releases
/// it, so at most one guard exists at a time.
///
/// ```compile_fail
/// let mutex = collector::SpinMutex::new(0);
/// let _guard = mutex.lock();
/// mutex.raw().unlock();
/// ```
pub struct SpinMutex<T: ?Sized> {
    lock: SpinLock,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `lock`.
unsafe impl<T: ?Sized + Send> Send for SpinMutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinMutex<T> {}

impl<T> SpinMutex<T> {
    /// Wraps a value.
    pub const fn new(value: T) -> Self {
        SpinMutex {
            lock: SpinLock::new(),
            data: UnsafeCell::new(value),
        }
    }
}

impl<T: ?Sized> SpinMutex<T> {
    /// Acquires the lock and returns a guard.
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        self.lock.lock();
        SpinMutexGuard { mutex: self }
    }

    /// Acquires the lock if it is free right now.
    pub fn try_lock(&self) -> Option<SpinMutexGuard<'_, T>> {
        if self.lock.try_lock() {
            Some(SpinMutexGuard { mutex: self })
        } else {
            None
        }
    }

    /// Returns true if some thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl<T: Default> Default for SpinMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for SpinMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinMutex")
            .field("locked", &self.is_locked())
            .finish_non_exhaustive()
    }
}

/// RAII guard for a [`SpinMutex`]; releases the lock on drop.
pub struct SpinMutexGuard<'a, T: ?Sized> {
    mutex: &'a SpinMutex<T>,
}

impl<T: ?Sized> Deref for SpinMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock.
        unsafe { &mut *self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinMutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.lock.unlock();
    }
}
