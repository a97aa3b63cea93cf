//! Collection requests against a multithreaded zone

use collector::aux_alloc::AuxZone;
use collector::{CollectionContext, CoordinatorState, RecordingSink, Zone, ZoneConfig};
use core_types::{CollectionMode, CollectionStatus, ErrorKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn counting_zone(passes: Arc<AtomicUsize>) -> Zone {
    Zone::with_config(ZoneConfig::default(), move |_: &CollectionContext<'_>| {
        passes.fetch_add(1, Ordering::AcqRel);
        CollectionStatus::Ok
    })
    .unwrap()
}

fn wait_until(mut done: impl FnMut() -> bool) {
    while !done() {
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_eight_threads_share_one_pass() {
    let passes = Arc::new(AtomicUsize::new(0));
    let zone = counting_zone(Arc::clone(&passes));

    zone.disable_collection();
    let statuses: Vec<CollectionStatus> = thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| s.spawn(|| zone.collect(CollectionMode::Full)))
            .collect();
        wait_until(|| zone.waiting_requesters() == 8);
        zone.enable_collection();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(statuses, vec![CollectionStatus::Ok; 8]);
    assert_eq!(passes.load(Ordering::Acquire), 1);
    assert_eq!(zone.collection_count(), 1);

    let stats = zone.statistics();
    assert_eq!(stats.requests, 8);
    assert_eq!(stats.deferred_requests, 1);
    assert_eq!(stats.coalesced_requests, 7);
}

#[test]
fn test_unsynchronized_callers_count_executed_passes() {
    let passes = Arc::new(AtomicUsize::new(0));
    let zone = counting_zone(Arc::clone(&passes));

    let statuses: Vec<CollectionStatus> = thread::scope(|s| {
        let workers: Vec<_> = (0..8)
            .map(|_| s.spawn(|| zone.collect(CollectionMode::Incremental)))
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    let executed = passes.load(Ordering::Acquire);
    assert!(statuses.iter().all(|s| *s == CollectionStatus::Ok));
    assert!((1..=8).contains(&executed));
    assert_eq!(zone.collection_count(), executed as u64);
    assert_eq!(zone.coordinator_state(), CoordinatorState::Idle);
}

#[test]
fn test_waiters_observe_the_same_failure() {
    let release = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&release);
    let zone = Zone::with_config(ZoneConfig::default(), move |_: &CollectionContext<'_>| {
        while !gate.load(Ordering::Acquire) {
            thread::yield_now();
        }
        CollectionStatus::Error
    })
    .unwrap();

    let statuses: Vec<CollectionStatus> = thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|_| s.spawn(|| zone.collect(CollectionMode::Full)))
            .collect();
        wait_until(|| zone.waiting_requesters() == 4);
        release.store(true, Ordering::Release);
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(statuses, vec![CollectionStatus::Error; 4]);
    assert_eq!(zone.collection_count(), 0);
    assert_eq!(zone.statistics().failed, 1);
}

#[test]
fn test_requests_during_pass_merge_to_strongest_mode() {
    let release = Arc::new(AtomicBool::new(false));
    let modes = Arc::new(Mutex::new(Vec::new()));
    let (gate, seen) = (Arc::clone(&release), Arc::clone(&modes));
    let zone = Zone::with_config(ZoneConfig::default(), move |ctx: &CollectionContext<'_>| {
        seen.lock().push(ctx.mode());
        while !gate.load(Ordering::Acquire) {
            thread::yield_now();
        }
        CollectionStatus::Ok
    })
    .unwrap();

    zone.disable_collection();
    assert_eq!(zone.request_collection(CollectionMode::Incremental), None);
    assert_eq!(zone.request_collection(CollectionMode::Exhaustive), None);
    assert_eq!(zone.request_collection(CollectionMode::Full), None);
    assert_eq!(zone.pending_collection(), Some(CollectionMode::Exhaustive));

    release.store(true, Ordering::Release);
    zone.enable_collection();
    zone.wait_for_idle();

    assert_eq!(*modes.lock(), vec![CollectionMode::Exhaustive]);
    assert_eq!(zone.collection_count(), 1);
}

#[test]
fn test_interrupt_reaches_running_pass() {
    let started = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&started);
    let zone = Zone::with_config(ZoneConfig::default(), move |ctx: &CollectionContext<'_>| {
        flag.store(true, Ordering::Release);
        while !ctx.is_interrupted() {
            thread::yield_now();
        }
        CollectionStatus::Interrupted
    })
    .unwrap();

    let status = thread::scope(|s| {
        let worker = s.spawn(|| zone.collect(CollectionMode::Full));
        wait_until(|| started.load(Ordering::Acquire));
        zone.interrupt_collection();
        worker.join().unwrap()
    });

    assert_eq!(status, CollectionStatus::Interrupted);
    assert!(status.is_retryable());
    assert_eq!(zone.collection_count(), 0);
}

#[test]
fn test_shutdown_interrupts_deferred_waiter() {
    let passes = Arc::new(AtomicUsize::new(0));
    let zone = counting_zone(Arc::clone(&passes));

    zone.disable_collection();
    let status = thread::scope(|s| {
        let worker = s.spawn(|| zone.collect(CollectionMode::Full));
        wait_until(|| zone.waiting_requesters() == 1);
        zone.shutdown();
        worker.join().unwrap()
    });

    assert_eq!(status, CollectionStatus::Interrupted);
    assert_eq!(passes.load(Ordering::Acquire), 0);
    assert!(zone.is_shut_down());
}

#[test]
fn test_unbalanced_enable_leaves_gate_usable() {
    let sink = Arc::new(RecordingSink::new());
    let zone = Zone::with_environment(
        ZoneConfig::default(),
        |_: &CollectionContext<'_>| CollectionStatus::Ok,
        Arc::new(AuxZone::new()),
        sink.clone(),
    )
    .unwrap();

    zone.enable_collection();
    assert_eq!(sink.take()[0].kind, ErrorKind::UnbalancedEnable);

    zone.disable_collection();
    assert!(!zone.is_collection_enabled());
    zone.enable_collection();
    assert!(zone.is_collection_enabled());
    assert!(sink.reports().is_empty());
    assert_eq!(zone.statistics().errors_reported, 1);
}
