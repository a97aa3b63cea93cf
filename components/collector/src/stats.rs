//! Collector statistics
//!
//! Counters live behind their own spin lock, separate from the coordinator
//! mutex, so reading statistics never holds up a collection and a
//! collection never holds up a reader.

use crate::spin_lock::SpinMutex;
use core_types::CollectionStatus;
use serde::Serialize;
use std::time::Duration;

/// Point-in-time copy of a zone's counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Collection requests received
    pub requests: u64,
    /// Requests folded into a cycle already requested or running
    pub coalesced_requests: u64,
    /// Requests held back because collection was disabled
    pub deferred_requests: u64,
    /// Passes handed to the collector
    pub passes: u64,
    /// Passes that completed
    pub completed: u64,
    /// Passes that were interrupted
    pub interrupted: u64,
    /// Passes that failed
    pub failed: u64,
    /// Duration of the most recent pass in microseconds
    pub last_pass_us: u64,
    /// Total time spent in passes in microseconds
    pub total_pass_us: u64,
    /// Weak references registered over the zone's lifetime
    pub weak_registered: u64,
    /// Weak references currently registered
    pub weak_live: u64,
    /// Reports delivered to the error sink
    pub errors_reported: u64,
    /// Auxiliary allocator bytes in use when the snapshot was taken
    pub aux_bytes_in_use: u64,
}

/// The statistics block of a zone.
#[derive(Debug, Default)]
pub struct Statistics {
    counters: SpinMutex<StatsSnapshot>,
}

impl Statistics {
    /// Creates a block with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `f` to the counters under the statistics lock.
    pub fn update(&self, f: impl FnOnce(&mut StatsSnapshot)) {
        f(&mut self.counters.lock());
    }

    /// Records a finished pass.
    pub fn record_pass(&self, status: CollectionStatus, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.update(|s| {
            s.passes += 1;
            match status {
                CollectionStatus::Ok => s.completed += 1,
                CollectionStatus::Interrupted => s.interrupted += 1,
                CollectionStatus::Error => s.failed += 1,
            }
            s.last_pass_us = micros;
            s.total_pass_us = s.total_pass_us.saturating_add(micros);
        });
    }

    /// Copies the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.counters.lock().clone()
    }
}
