//! Collection coordinator
//!
//! The handshake between mutator threads that request collections and the
//! thread that runs them.
//!
//! # States
//!
//! ```text
//!            request                thread wakes             pass returns
//!   Idle ─────────────▶ Requested ─────────────▶ Running ─────────────▶ Completed(status)
//!    ▲  ╲ gate closed                                                         │
//!    │   ╲──▶ Idle + pending ──(gate reopens)──▶ Requested                    │
//!    └───────────────────────── last waiter acknowledges ────────────────────┘
//! ```
//!
//! Every requester that waits is counted against the one cycle that is
//! pending, requested, running or completed. The cycle stays `Completed`
//! until all of them have read its status; the last one moves the
//! coordinator back to `Idle`. A request that arrives while a cycle is
//! requested or running joins that cycle instead of starting another.
//!
//! In single-threaded mode there is no `Requested` state: the requesting
//! thread moves the coordinator straight to `Running` and runs the pass
//! itself.

use core_types::{CollectionMode, CollectionStatus};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// Observable state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No cycle in progress
    Idle,
    /// A cycle was requested and the collection thread has not picked it up
    Requested(CollectionMode),
    /// A pass is executing
    Running(CollectionMode),
    /// A pass finished and waiters have not all read the status
    Completed(CollectionStatus),
}

/// What became of a collection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A new cycle was started for this request
    Started,
    /// The request joined a cycle already pending, requested or running
    Coalesced,
    /// The gate was closed; the cycle waits for it to reopen
    Deferred,
    /// The coordinator has shut down
    Rejected,
}

/// The work a coordinator drives.
pub trait PassRunner {
    /// Returns true if a new cycle may start.
    fn gate_open(&self) -> bool;

    /// Executes one pass. Called without the coordinator mutex held.
    fn run_pass(&self, mode: CollectionMode) -> CollectionStatus;

    /// Observes the fate of each request.
    fn on_request(&self, _mode: CollectionMode, _disposition: Disposition) {}
}

struct Handshake {
    state: CoordinatorState,
    /// Mode of a cycle held back by the gate
    pending: Option<CollectionMode>,
    /// Requesters waiting for the current cycle's status
    waiters: usize,
    shutdown: bool,
}

/// Mutex, conditions and state of the collection handshake.
pub struct Coordinator {
    multithreaded: bool,
    handshake: Mutex<Handshake>,
    /// Signalled when a cycle is requested or the coordinator shuts down
    requested: Condvar,
    /// Signalled when a status is posted or the coordinator returns to idle
    status: Condvar,
    interrupt: AtomicBool,
    passes_in_flight: AtomicUsize,
}

impl Coordinator {
    /// Creates an idle coordinator.
    ///
    /// With `multithreaded`, passes run on a thread executing
    /// [`run_collection_thread`](Self::run_collection_thread); otherwise on
    /// the requesting thread.
    pub fn new(multithreaded: bool) -> Self {
        Coordinator {
            multithreaded,
            handshake: Mutex::new(Handshake {
                state: CoordinatorState::Idle,
                pending: None,
                waiters: 0,
                shutdown: false,
            }),
            requested: Condvar::new(),
            status: Condvar::new(),
            interrupt: AtomicBool::new(false),
            passes_in_flight: AtomicUsize::new(0),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> CoordinatorState {
        self.handshake.lock().state
    }

    /// Returns the mode of a cycle held back by the gate.
    pub fn pending(&self) -> Option<CollectionMode> {
        self.handshake.lock().pending
    }

    /// Number of requesters blocked on the current cycle.
    pub fn waiters(&self) -> usize {
        self.handshake.lock().waiters
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.handshake.lock().shutdown
    }

    /// Returns true if the running pass should stop early.
    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }

    /// Asks the running pass, if any, to stop early.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::Release);
    }

    /// Requests a cycle.
    ///
    /// With `wait`, blocks until the cycle this request started or joined
    /// completes and returns its status. Without `wait`, returns the status
    /// only when the pass ran synchronously on this thread.
    ///
    /// Waiting while this thread holds the gate closed deadlocks.
    pub fn request(
        &self,
        runner: &dyn PassRunner,
        mode: CollectionMode,
        wait: bool,
    ) -> Option<CollectionStatus> {
        let mut h = self.handshake.lock();

        // A completed cycle belongs to its waiters; let them drain first
        while matches!(h.state, CoordinatorState::Completed(_)) {
            self.status.wait(&mut h);
        }

        if h.shutdown {
            runner.on_request(mode, Disposition::Rejected);
            return Some(CollectionStatus::Interrupted);
        }

        let disposition = match h.state {
            CoordinatorState::Requested(current) => {
                h.state = CoordinatorState::Requested(current.merge(mode));
                Disposition::Coalesced
            }
            CoordinatorState::Running(_) => Disposition::Coalesced,
            CoordinatorState::Idle => match h.pending {
                Some(current) => {
                    h.pending = Some(current.merge(mode));
                    Disposition::Coalesced
                }
                None if !runner.gate_open() => {
                    h.pending = Some(mode);
                    Disposition::Deferred
                }
                None if self.multithreaded => {
                    h.state = CoordinatorState::Requested(mode);
                    self.requested.notify_one();
                    Disposition::Started
                }
                None => {
                    runner.on_request(mode, Disposition::Started);
                    return Some(self.run_locked(&mut h, runner, mode));
                }
            },
            CoordinatorState::Completed(_) => unreachable!("completed cycles drained above"),
        };
        debug!(target: "collector::coordinator", ?mode, ?disposition, wait, "collection requested");
        runner.on_request(mode, disposition);

        if !wait {
            return None;
        }
        Some(self.wait_for_status(&mut h))
    }

    /// Re-checks a cycle held back by the gate.
    ///
    /// Called after the gate reopens. In single-threaded mode the pass runs
    /// here and its status is returned.
    pub fn gate_reopened(&self, runner: &dyn PassRunner) -> Option<CollectionStatus> {
        let mut h = self.handshake.lock();
        if h.shutdown || h.state != CoordinatorState::Idle || !runner.gate_open() {
            return None;
        }
        let mode = h.pending.take()?;
        debug!(target: "collector::coordinator", ?mode, "deferred collection released");
        if self.multithreaded {
            h.state = CoordinatorState::Requested(mode);
            self.requested.notify_one();
            None
        } else {
            Some(self.run_locked(&mut h, runner, mode))
        }
    }

    /// Blocks until the coordinator is idle.
    ///
    /// A cycle held back by a closed gate does not count as in progress.
    pub fn wait_for_idle(&self) {
        let mut h = self.handshake.lock();
        while h.state != CoordinatorState::Idle {
            self.status.wait(&mut h);
        }
    }

    /// Body of the dedicated collection thread. Returns after shutdown.
    pub fn run_collection_thread(&self, runner: &dyn PassRunner) {
        debug_assert!(self.multithreaded);
        let mut h = self.handshake.lock();
        debug!(target: "collector::coordinator", "collection thread started");
        loop {
            match h.state {
                CoordinatorState::Requested(mode) => {
                    if h.shutdown {
                        self.post(&mut h, CollectionStatus::Interrupted);
                    } else if !runner.gate_open() {
                        // Disabled after the request was made; hold it back
                        debug!(target: "collector::coordinator", ?mode, "collection deferred by gate");
                        h.state = CoordinatorState::Idle;
                        h.pending = Some(h.pending.map_or(mode, |p| p.merge(mode)));
                        self.status.notify_all();
                    } else {
                        self.run_locked(&mut h, runner, mode);
                    }
                }
                _ if h.shutdown => break,
                _ => self.requested.wait(&mut h),
            }
        }
        debug!(target: "collector::coordinator", "collection thread exiting");
    }

    /// Stops accepting requests.
    ///
    /// Cycles that have not started complete as `Interrupted`, and the
    /// running pass is asked to stop. Idempotent.
    pub fn shutdown(&self) {
        let mut h = self.handshake.lock();
        if h.shutdown {
            return;
        }
        h.shutdown = true;
        self.interrupt.store(true, Ordering::Release);
        if h.pending.take().is_some() {
            self.post(&mut h, CollectionStatus::Interrupted);
        }
        self.requested.notify_all();
        self.status.notify_all();
    }

    fn run_locked(
        &self,
        h: &mut MutexGuard<'_, Handshake>,
        runner: &dyn PassRunner,
        mode: CollectionMode,
    ) -> CollectionStatus {
        h.state = CoordinatorState::Running(mode);
        if !h.shutdown {
            self.interrupt.store(false, Ordering::Release);
        }

        let status = MutexGuard::unlocked(h, || {
            let concurrent = self.passes_in_flight.fetch_add(1, Ordering::AcqRel);
            debug_assert_eq!(concurrent, 0, "two collection passes running at once");
            let status = runner.run_pass(mode);
            self.passes_in_flight.fetch_sub(1, Ordering::AcqRel);
            status
        });

        self.post(h, status);
        status
    }

    /// Publishes a terminal status and wakes waiters.
    fn post(&self, h: &mut MutexGuard<'_, Handshake>, status: CollectionStatus) {
        h.state = if h.waiters == 0 {
            CoordinatorState::Idle
        } else {
            CoordinatorState::Completed(status)
        };
        self.status.notify_all();
    }

    fn wait_for_status(&self, h: &mut MutexGuard<'_, Handshake>) -> CollectionStatus {
        h.waiters += 1;
        let status = loop {
            if let CoordinatorState::Completed(status) = h.state {
                break status;
            }
            self.status.wait(h);
        };
        h.waiters -= 1;
        if h.waiters == 0 {
            h.state = CoordinatorState::Idle;
            self.status.notify_all();
        }
        status
    }
}
