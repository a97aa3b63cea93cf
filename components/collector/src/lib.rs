//! Collector - control core of a concurrent garbage collector
//!
//! This component provides:
//! - A fork-safe spin lock for short critical sections
//! - Lock-guarded pointer sets and maps used as collector metadata
//! - An auxiliary allocator that keeps metadata out of the collected heap
//! - A weak reference registry with stable handles
//! - A nesting gate that suspends new collection cycles
//! - A coordinator that coalesces requests and hands passes to a
//!   dedicated collection thread
//! - Per-zone statistics
//!
//! The trace and sweep algorithms themselves live outside this crate and
//! plug in through the [`Collector`] trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aux_alloc;
pub mod config;
pub mod coordinator;
pub mod gate;
pub mod ptr_map;
pub mod ptr_set;
mod ptr_table;
pub mod sink;
pub mod spin_lock;
pub mod stats;
pub mod weak;
pub mod zone;

// Re-export main types
pub use aux_alloc::{AuxBuffer, AuxZone};
pub use config::{CollectionControl, ZoneConfig};
pub use coordinator::{Coordinator, CoordinatorState, Disposition, PassRunner};
pub use gate::{CollectorGate, GateUnderflow};
pub use ptr_map::{PtrMap, PtrMapGuard};
pub use ptr_set::{PtrSet, PtrSetGuard};
pub use sink::{ErrorSink, RecordingSink, TracingSink};
pub use spin_lock::{SpinLock, SpinMutex, SpinMutexGuard};
pub use stats::{Statistics, StatsSnapshot};
pub use weak::{WeakHandle, WeakRegistry};
pub use zone::{CollectionContext, CollectionDisabled, Collector, Zone};
