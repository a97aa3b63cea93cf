//! Error types shared by the collector components.
//!
//! Collection outcomes are not errors (see [`CollectionStatus`](crate::CollectionStatus)).
//! The types here cover the collector being unable to make progress at all
//! and the kinds of misuse reported to an error sink.

use crate::Address;
use std::fmt;
use thiserror::Error;

/// Kind of problem reported to a zone's error sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `enable` called more times than `disable`
    UnbalancedEnable,
    /// A weak handle that was already released, or never issued
    StaleWeakHandle,
    /// A reference count dropped below zero
    RefcountUnderflow,
    /// A collected object was made reachable again
    Resurrection,
    /// The tracer found the heap in an inconsistent state
    HeapCorruption,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnbalancedEnable => "unbalanced enable",
            ErrorKind::StaleWeakHandle => "stale weak handle",
            ErrorKind::RefcountUnderflow => "reference count underflow",
            ErrorKind::Resurrection => "resurrection",
            ErrorKind::HeapCorruption => "heap corruption",
        };
        f.write_str(name)
    }
}

/// A single report delivered to an error sink.
///
/// # Examples
///
/// ```
/// use core_types::{Address, ErrorKind, ErrorReport};
///
/// let report = ErrorReport::new(ErrorKind::Resurrection, "object revived")
///     .with_address(Address::new(0x40));
/// assert_eq!(report.to_string(), "resurrection: object revived (0x40)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// What went wrong
    pub kind: ErrorKind,
    /// Human-readable detail
    pub message: String,
    /// The address involved, if any
    pub address: Option<Address>,
}

impl ErrorReport {
    /// Creates a report with no address.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ErrorReport {
            kind,
            message: message.into(),
            address: None,
        }
    }

    /// Attaches the offending address.
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(addr) = self.address {
            write!(f, " ({})", addr)?;
        }
        Ok(())
    }
}

/// Failure of the auxiliary allocator that backs collector metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuxError {
    /// The arena could not satisfy the request.
    #[error("auxiliary allocator exhausted: requested {requested} bytes, {in_use} in use")]
    Exhausted {
        /// Bytes asked for
        requested: usize,
        /// Bytes already handed out
        in_use: usize,
    },
    /// Size or alignment cannot be represented.
    #[error("invalid auxiliary allocation: {count} x {size} bytes")]
    InvalidLayout {
        /// Element count
        count: usize,
        /// Element size
        size: usize,
    },
}

/// Errors surfaced by zone construction and metadata operations.
#[derive(Debug, Error)]
pub enum ZoneError {
    /// Collector metadata could not be allocated.
    #[error(transparent)]
    Aux(#[from] AuxError),
    /// The dedicated collection thread could not be started.
    #[error("failed to spawn collection thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}
