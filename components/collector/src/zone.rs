//! The collector zone
//!
//! A [`Zone`] ties the components together: it owns the gate, the
//! coordinator, the weak registry, the pointer set and map handed to the
//! tracer, the statistics block, and, in multithreaded mode, the dedicated
//! collection thread. Each of those has its own lock; no lock covers the
//! whole zone.

use crate::aux_alloc::{aux_init, AuxZone};
use crate::config::{CollectionControl, ZoneConfig};
use crate::coordinator::{Coordinator, CoordinatorState, Disposition, PassRunner};
use crate::gate::CollectorGate;
use crate::ptr_map::PtrMap;
use crate::ptr_set::PtrSet;
use crate::sink::{ErrorSink, TracingSink};
use crate::spin_lock;
use crate::stats::{Statistics, StatsSnapshot};
use crate::weak::{WeakHandle, WeakRegistry};
use core_types::{Address, CollectionMode, CollectionStatus, ErrorKind, ErrorReport, ZoneError};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// The external trace/sweep algorithm.
///
/// Implemented outside this crate. A pass receives the zone's bookkeeping
/// through a [`CollectionContext`] and reports how it ended.
pub trait Collector: Send + Sync {
    /// Runs one pass.
    fn collect(&self, ctx: &CollectionContext<'_>) -> CollectionStatus;
}

impl<F> Collector for F
where
    F: Fn(&CollectionContext<'_>) -> CollectionStatus + Send + Sync,
{
    fn collect(&self, ctx: &CollectionContext<'_>) -> CollectionStatus {
        self(ctx)
    }
}

/// What a pass can see of its zone.
pub struct CollectionContext<'a> {
    mode: CollectionMode,
    cycle: u64,
    shared: &'a ZoneShared,
}

impl<'a> CollectionContext<'a> {
    /// Mode requested for this pass.
    pub fn mode(&self) -> CollectionMode {
        self.mode
    }

    /// Sequence number this pass gets if it completes.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Addresses of allocated blocks.
    pub fn allocated(&self) -> &'a PtrSet {
        &self.shared.allocated
    }

    /// Per-address metadata.
    pub fn metadata(&self) -> &'a PtrMap {
        &self.shared.metadata
    }

    /// The zone's weak references.
    pub fn weak_refs(&self) -> &'a WeakRegistry {
        &self.shared.weak_refs
    }

    /// Policy knobs from the zone configuration.
    pub fn control(&self) -> &'a CollectionControl {
        &self.shared.config.control
    }

    /// Returns true if the pass should stop and report `Interrupted`.
    pub fn is_interrupted(&self) -> bool {
        self.shared.coordinator.is_interrupted()
    }

    /// Sends a report to the zone's error sink.
    pub fn report(&self, report: ErrorReport) {
        self.shared.report(report);
    }
}

struct ZoneShared {
    config: ZoneConfig,
    collector: Box<dyn Collector>,
    aux: Arc<AuxZone>,
    sink: Arc<dyn ErrorSink>,
    gate: CollectorGate,
    coordinator: Coordinator,
    collection_count: AtomicU64,
    stats: Statistics,
    weak_refs: WeakRegistry,
    allocated: PtrSet,
    metadata: PtrMap,
}

impl ZoneShared {
    fn report(&self, report: ErrorReport) {
        self.stats.update(|s| s.errors_reported += 1);
        self.sink.report(&report);
    }
}

impl PassRunner for ZoneShared {
    fn gate_open(&self) -> bool {
        self.gate.is_enabled()
    }

    fn run_pass(&self, mode: CollectionMode) -> CollectionStatus {
        let cycle = self.collection_count.load(Ordering::Acquire) + 1;
        info!(target: "collector::zone", cycle, ?mode, "collection pass starting");

        let start = Instant::now();
        let ctx = CollectionContext {
            mode,
            cycle,
            shared: self,
        };
        let status = match catch_unwind(AssertUnwindSafe(|| self.collector.collect(&ctx))) {
            Ok(status) => status,
            Err(_) => {
                self.report(ErrorReport::new(
                    ErrorKind::HeapCorruption,
                    "collector panicked during a pass",
                ));
                CollectionStatus::Error
            }
        };
        let elapsed = start.elapsed();

        if status.is_ok() {
            self.collection_count.fetch_add(1, Ordering::AcqRel);
        }
        self.stats.record_pass(status, elapsed);

        let pause_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        match status {
            CollectionStatus::Ok => {
                info!(target: "collector::zone", cycle, pause_us, "collection pass complete")
            }
            CollectionStatus::Interrupted => {
                warn!(target: "collector::zone", cycle, pause_us, "collection pass interrupted")
            }
            CollectionStatus::Error => {
                error!(target: "collector::zone", cycle, pause_us, "collection pass failed")
            }
        }
        status
    }

    fn on_request(&self, _mode: CollectionMode, disposition: Disposition) {
        self.stats.update(|s| {
            s.requests += 1;
            match disposition {
                Disposition::Coalesced => s.coalesced_requests += 1,
                Disposition::Deferred => s.deferred_requests += 1,
                Disposition::Started | Disposition::Rejected => {}
            }
        });
    }
}

/// One collector instance.
///
/// Created once, shared by reference between mutator threads, and shut
/// down explicitly or on drop.
///
/// # Examples
///
/// ```
/// use collector::{CollectionContext, Zone, ZoneConfig};
/// use core_types::{CollectionMode, CollectionStatus};
///
/// let zone = Zone::with_config(ZoneConfig::default(), |_: &CollectionContext<'_>| {
///     CollectionStatus::Ok
/// })
/// .unwrap();
///
/// assert_eq!(zone.collect(CollectionMode::Full), CollectionStatus::Ok);
/// assert_eq!(zone.collection_count(), 1);
/// ```
pub struct Zone {
    shared: Arc<ZoneShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Zone {
    /// Creates a zone with the default configuration.
    pub fn new(collector: impl Collector + 'static) -> Result<Self, ZoneError> {
        Self::with_config(ZoneConfig::default(), collector)
    }

    /// Creates a zone using the process-wide auxiliary zone and logging sink.
    pub fn with_config(
        config: ZoneConfig,
        collector: impl Collector + 'static,
    ) -> Result<Self, ZoneError> {
        Self::with_environment(config, collector, aux_init(), Arc::new(TracingSink))
    }

    /// Creates a zone with an explicit metadata arena and error sink.
    pub fn with_environment(
        config: ZoneConfig,
        collector: impl Collector + 'static,
        aux: Arc<AuxZone>,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self, ZoneError> {
        let shared = Arc::new(ZoneShared {
            weak_refs: WeakRegistry::new(&aux, config.weak_table_capacity)?,
            allocated: PtrSet::with_capacity(&aux, config.pointer_table_capacity)?,
            metadata: PtrMap::with_capacity(&aux, config.pointer_table_capacity)?,
            coordinator: Coordinator::new(config.multithreaded),
            gate: CollectorGate::new(),
            collection_count: AtomicU64::new(0),
            stats: Statistics::new(),
            collector: Box::new(collector),
            aux,
            sink,
            config,
        });

        let thread = if shared.config.multithreaded {
            spin_lock::mark_threaded();
            let runner = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(shared.config.thread_name.clone())
                .spawn(move || runner.coordinator.run_collection_thread(&*runner))
                .map_err(ZoneError::ThreadSpawn)?;
            Some(handle)
        } else {
            None
        };

        debug!(
            target: "collector::zone",
            multithreaded = shared.config.multithreaded,
            weak_capacity = shared.config.weak_table_capacity,
            "zone created"
        );
        Ok(Zone {
            shared,
            thread: Mutex::new(thread),
        })
    }

    // ---- collection ----

    /// Asks for a collection without waiting for it.
    ///
    /// Returns the status only if the pass ran on this thread, which happens
    /// in single-threaded mode when the gate is open.
    pub fn request_collection(&self, mode: CollectionMode) -> Option<CollectionStatus> {
        self.shared.coordinator.request(&*self.shared, mode, false)
    }

    /// Forces a collection and waits for its outcome.
    ///
    /// Joins a cycle already requested or running instead of starting a
    /// second one. Must not be called while this thread keeps collection
    /// disabled.
    pub fn collect(&self, mode: CollectionMode) -> CollectionStatus {
        self.shared
            .coordinator
            .request(&*self.shared, mode, true)
            .unwrap_or(CollectionStatus::Interrupted)
    }

    /// Blocks until no cycle is requested, running or awaiting acknowledgement.
    pub fn wait_for_idle(&self) {
        self.shared.coordinator.wait_for_idle();
    }

    /// Asks the running pass to stop early.
    pub fn interrupt_collection(&self) {
        self.shared.coordinator.interrupt();
    }

    /// Current coordinator state.
    pub fn coordinator_state(&self) -> CoordinatorState {
        self.shared.coordinator.state()
    }

    /// Mode of a cycle held back by the gate, if any.
    pub fn pending_collection(&self) -> Option<CollectionMode> {
        self.shared.coordinator.pending()
    }

    /// Number of callers blocked in [`collect`](Self::collect).
    pub fn waiting_requesters(&self) -> usize {
        self.shared.coordinator.waiters()
    }

    /// Number of passes that completed.
    pub fn collection_count(&self) -> u64 {
        self.shared.collection_count.load(Ordering::Acquire)
    }

    // ---- gate ----

    /// Suspends new collection cycles. Nests.
    pub fn disable_collection(&self) {
        let depth = self.shared.gate.disable();
        debug!(target: "collector::gate", depth, "collection disabled");
    }

    /// Undoes one [`disable_collection`](Self::disable_collection).
    ///
    /// Reopening the gate releases a deferred request. An unmatched call is
    /// refused and reported to the error sink.
    pub fn enable_collection(&self) {
        match self.shared.gate.enable() {
            Ok(0) => {
                debug!(target: "collector::gate", "collection enabled");
                self.shared.coordinator.gate_reopened(&*self.shared);
            }
            Ok(depth) => debug!(target: "collector::gate", depth, "collection still disabled"),
            Err(underflow) => self.shared.report(ErrorReport::new(
                ErrorKind::UnbalancedEnable,
                underflow.to_string(),
            )),
        }
    }

    /// Returns true if new cycles may start.
    pub fn is_collection_enabled(&self) -> bool {
        self.shared.gate.is_enabled()
    }

    /// Current nesting depth of `disable_collection` calls.
    pub fn disable_depth(&self) -> i32 {
        self.shared.gate.depth()
    }

    /// Disables collection until the returned guard drops.
    pub fn disable_scope(&self) -> CollectionDisabled<'_> {
        self.disable_collection();
        CollectionDisabled { zone: self }
    }

    // ---- weak references ----

    /// Registers a weak reference to `referent`.
    pub fn register_weak(&self, referent: Address) -> Result<WeakHandle, ZoneError> {
        let handle = self.shared.weak_refs.register(referent)?;
        self.shared.stats.update(|s| s.weak_registered += 1);
        Ok(handle)
    }

    /// Current referent of `handle`, or `None` once cleared.
    pub fn resolve_weak(&self, handle: WeakHandle) -> Option<Address> {
        self.shared.weak_refs.resolve(handle)
    }

    /// Clears `handle`'s referent. Idempotent.
    pub fn clear_weak(&self, handle: WeakHandle) {
        self.shared.weak_refs.clear(handle);
    }

    /// Releases `handle`. A second release is reported and otherwise ignored.
    pub fn unregister_weak(&self, handle: WeakHandle) {
        if !self.shared.weak_refs.unregister(handle) {
            self.shared.report(ErrorReport::new(
                ErrorKind::StaleWeakHandle,
                format!("weak handle {} released twice or never issued", handle.index()),
            ));
        }
    }

    /// The zone's weak registry.
    pub fn weak_refs(&self) -> &WeakRegistry {
        &self.shared.weak_refs
    }

    // ---- pointer tracking ----

    /// Addresses of allocated blocks, maintained by allocator glue.
    pub fn allocated(&self) -> &PtrSet {
        &self.shared.allocated
    }

    /// Per-address metadata, maintained by allocator glue.
    pub fn metadata(&self) -> &PtrMap {
        &self.shared.metadata
    }

    // ---- errors ----

    /// Sends a report to the error sink.
    pub fn report_error(&self, report: ErrorReport) {
        self.shared.report(report);
    }

    /// Reports a reference count dropping below zero.
    pub fn report_refcount_underflow(&self, addr: Address) {
        self.report_error(
            ErrorReport::new(ErrorKind::RefcountUnderflow, "reference count underflow")
                .with_address(addr),
        );
    }

    /// Reports an object made reachable after it was collected.
    pub fn report_resurrection(&self, addr: Address) {
        self.report_error(
            ErrorReport::new(ErrorKind::Resurrection, "collected object resurrected")
                .with_address(addr),
        );
    }

    // ---- misc ----

    /// Copies the statistics counters.
    pub fn statistics(&self) -> StatsSnapshot {
        let mut snapshot = self.shared.stats.snapshot();
        snapshot.weak_live = self.shared.weak_refs.len() as u64;
        snapshot.aux_bytes_in_use = self.shared.aux.bytes_in_use() as u64;
        snapshot
    }

    /// The zone's configuration.
    pub fn config(&self) -> &ZoneConfig {
        &self.shared.config
    }

    /// Returns true if passes run on a dedicated thread.
    pub fn is_multithreaded(&self) -> bool {
        self.shared.config.multithreaded
    }

    /// Whether allocator glue should start objects at reference count one.
    pub fn initial_refcount_to_one(&self) -> bool {
        self.shared.config.initial_refcount_to_one
    }

    /// Stops the zone.
    ///
    /// Requests not yet started complete as `Interrupted`, the running pass
    /// is asked to stop, and the collection thread is joined. Later
    /// requests return `Interrupted`. Idempotent.
    pub fn shutdown(&self) {
        self.shared.coordinator.shutdown();
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!(target: "collector::zone", "collection thread panicked");
            }
            info!(target: "collector::zone", collections = self.collection_count(), "zone shut down");
        }
    }

    /// Returns true once the zone has been shut down.
    pub fn is_shut_down(&self) -> bool {
        self.shared.coordinator.is_shut_down()
    }
}

impl Drop for Zone {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zone")
            .field("multithreaded", &self.shared.config.multithreaded)
            .field("state", &self.coordinator_state())
            .field("collection_count", &self.collection_count())
            .field("disable_depth", &self.shared.gate.depth())
            .finish_non_exhaustive()
    }
}

/// Keeps collection disabled while alive. See [`Zone::disable_scope`].
#[must_use = "collection is re-enabled as soon as the guard drops"]
pub struct CollectionDisabled<'a> {
    zone: &'a Zone,
}

impl Drop for CollectionDisabled<'_> {
    fn drop(&mut self) {
        self.zone.enable_collection();
    }
}
