//! Collector gate
//!
//! A nesting counter that suspends new collection cycles while positive.
//! Disabling never preempts a cycle that is already running.

use std::sync::atomic::{AtomicI32, Ordering};
use thiserror::Error;

/// `enable` was called with no matching `disable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("collection enabled more times than it was disabled")]
pub struct GateUnderflow;

/// The enable/disable counter of a zone.
///
/// # Examples
///
/// ```
/// use collector::CollectorGate;
///
/// let gate = CollectorGate::new();
/// gate.disable();
/// gate.disable();
/// assert_eq!(gate.enable(), Ok(1));
/// assert!(!gate.is_enabled());
/// assert_eq!(gate.enable(), Ok(0));
/// assert!(gate.is_enabled());
/// ```
#[derive(Debug, Default)]
pub struct CollectorGate {
    disable_count: AtomicI32,
}

impl CollectorGate {
    /// Creates an open gate.
    pub const fn new() -> Self {
        CollectorGate {
            disable_count: AtomicI32::new(0),
        }
    }

    /// Suspends new cycles. Returns the new nesting depth.
    pub fn disable(&self) -> i32 {
        self.disable_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Undoes one `disable`. Returns the new nesting depth.
    ///
    /// The counter never goes below zero; an unmatched call is refused.
    pub fn enable(&self) -> Result<i32, GateUnderflow> {
        self.disable_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                (depth > 0).then(|| depth - 1)
            })
            .map(|previous| previous - 1)
            .map_err(|_| GateUnderflow)
    }

    /// Returns true if new cycles may start.
    pub fn is_enabled(&self) -> bool {
        self.depth() <= 0
    }

    /// Current nesting depth.
    pub fn depth(&self) -> i32 {
        self.disable_count.load(Ordering::Acquire)
    }
}
