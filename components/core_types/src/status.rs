//! Collection modes and collection outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of collection a mutator asks for.
///
/// The core does not interpret the mode; it hands it to the external
/// collector. Modes are ordered so that coalesced requests can be merged
/// into the strongest one asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// Collect only recently allocated objects
    Incremental,
    /// Collect the whole heap
    Full,
    /// Collect the whole heap repeatedly until nothing more is reclaimed
    Exhaustive,
}

impl CollectionMode {
    /// Returns the stronger of two modes.
    pub fn merge(self, other: CollectionMode) -> CollectionMode {
        self.max(other)
    }
}

impl Default for CollectionMode {
    fn default() -> Self {
        CollectionMode::Incremental
    }
}

/// Terminal outcome of one collection pass.
///
/// # Examples
///
/// ```
/// use core_types::CollectionStatus;
///
/// assert_eq!(CollectionStatus::from_code(1), Some(CollectionStatus::Ok));
/// assert_eq!(CollectionStatus::Interrupted.code(), -1);
/// assert!(CollectionStatus::Interrupted.is_retryable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    /// The pass was stopped from outside; the heap is unchanged.
    Interrupted,
    /// The pass aborted on an internal invariant violation. Fatal.
    Error,
    /// The pass completed.
    Ok,
}

impl CollectionStatus {
    /// Numeric status code as reported by the native collector interface.
    pub const fn code(self) -> i32 {
        match self {
            CollectionStatus::Interrupted => -1,
            CollectionStatus::Error => 0,
            CollectionStatus::Ok => 1,
        }
    }

    /// Decodes a native status code.
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(CollectionStatus::Interrupted),
            0 => Some(CollectionStatus::Error),
            1 => Some(CollectionStatus::Ok),
            _ => None,
        }
    }

    /// Returns true if the pass completed.
    pub const fn is_ok(self) -> bool {
        matches!(self, CollectionStatus::Ok)
    }

    /// Returns true if a caller may try again later.
    ///
    /// Only interruption is retryable; an `Error` outcome is fatal.
    pub const fn is_retryable(self) -> bool {
        matches!(self, CollectionStatus::Interrupted)
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollectionStatus::Interrupted => "interrupted",
            CollectionStatus::Error => "error",
            CollectionStatus::Ok => "ok",
        };
        f.write_str(name)
    }
}
