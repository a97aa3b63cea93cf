//! Integration test suite for the collector
//!
//! This crate provides a small object graph with allocator glue and a
//! mark-sweep pass so the tests can drive a real [`Zone`] end to end.

use collector::{CollectionContext, Collector, Zone};
use core_types::{Address, CollectionStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Re-export components for test convenience
pub mod components {
    pub use collector;
    pub use core_types;
}

const OBJECT_ALIGN: usize = 16;

/// A toy heap: objects are addresses with outgoing edges.
#[derive(Default)]
pub struct ToyHeap {
    objects: Mutex<HashMap<Address, Vec<Address>>>,
    roots: Mutex<HashSet<Address>>,
    next: AtomicUsize,
}

impl ToyHeap {
    pub fn new() -> Arc<Self> {
        Arc::new(ToyHeap {
            next: AtomicUsize::new(0x10_0000),
            ..Default::default()
        })
    }

    /// Allocates an object and registers it with the zone.
    pub fn alloc(&self, zone: &Zone) -> Address {
        self.alloc_with(zone, false)
    }

    /// Allocates an object that is a root before any pass can see it.
    pub fn alloc_rooted(&self, zone: &Zone) -> Address {
        self.alloc_with(zone, true)
    }

    fn alloc_with(&self, zone: &Zone, rooted: bool) -> Address {
        let addr = Address::new(self.next.fetch_add(OBJECT_ALIGN, Ordering::Relaxed));
        let mut objects = self.objects.lock();
        objects.insert(addr, Vec::new());
        if rooted {
            self.roots.lock().insert(addr);
        }
        zone.allocated().add(addr).expect("aux zone exhausted");
        let refcount = usize::from(zone.initial_refcount_to_one());
        zone.metadata().set(addr, refcount).expect("aux zone exhausted");
        addr
    }

    pub fn link(&self, from: Address, to: Address) {
        if let Some(edges) = self.objects.lock().get_mut(&from) {
            edges.push(to);
        }
    }

    pub fn root(&self, addr: Address) {
        self.roots.lock().insert(addr);
    }

    pub fn unroot(&self, addr: Address) {
        self.roots.lock().remove(&addr);
    }

    pub fn is_live(&self, addr: Address) -> bool {
        self.objects.lock().contains_key(&addr)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }

    /// Wraps the heap as the zone's collector.
    pub fn collector(self: &Arc<Self>) -> impl Collector + 'static {
        let heap = Arc::clone(self);
        move |ctx: &CollectionContext<'_>| heap.mark_sweep(ctx)
    }

    fn mark_sweep(&self, ctx: &CollectionContext<'_>) -> CollectionStatus {
        let mut objects = self.objects.lock();

        let mut marked = HashSet::new();
        let mut worklist: Vec<Address> = self.roots.lock().iter().copied().collect();
        while let Some(addr) = worklist.pop() {
            if ctx.is_interrupted() {
                return CollectionStatus::Interrupted;
            }
            if !marked.insert(addr) {
                continue;
            }
            match objects.get(&addr) {
                Some(edges) => worklist.extend(edges.iter().copied()),
                None => {
                    ctx.report(
                        core_types::ErrorReport::new(
                            core_types::ErrorKind::Resurrection,
                            "root refers to a swept object",
                        )
                        .with_address(addr),
                    );
                    return CollectionStatus::Error;
                }
            }
        }

        let mut dead = Vec::new();
        let mut allocated = ctx.allocated().lock();
        allocated.for_each(|addr| {
            if !marked.contains(&addr) {
                dead.push(addr);
            }
        });
        for addr in &dead {
            allocated.remove(*addr);
            ctx.metadata().remove(*addr);
            objects.remove(addr);
        }
        drop(allocated);

        ctx.weak_refs().clear_unreachable(|addr| marked.contains(&addr));
        CollectionStatus::Ok
    }
}
