//! Mark-sweep passes driven through a zone

use collector::aux_alloc::AuxZone;
use collector::{RecordingSink, Zone, ZoneConfig};
use core_types::{CollectionMode, CollectionStatus, ErrorKind};
use integration_tests::ToyHeap;
use std::sync::Arc;

#[test]
fn test_unreachable_objects_are_swept() {
    let heap = ToyHeap::new();
    let zone = Zone::with_config(ZoneConfig::default(), heap.collector()).unwrap();

    let root = heap.alloc(&zone);
    let child = heap.alloc(&zone);
    let garbage = heap.alloc(&zone);
    heap.link(root, child);
    heap.root(root);

    assert_eq!(zone.collect(CollectionMode::Full), CollectionStatus::Ok);
    assert!(heap.is_live(root));
    assert!(heap.is_live(child));
    assert!(!heap.is_live(garbage));
    assert!(!zone.allocated().is_member(garbage));
    assert!(!zone.metadata().contains(garbage));
    assert_eq!(zone.allocated().len(), 2);
}

#[test]
fn test_weak_reference_cleared_when_referent_dies() {
    let heap = ToyHeap::new();
    let zone = Zone::with_config(ZoneConfig::default(), heap.collector()).unwrap();

    let obj = heap.alloc(&zone);
    heap.root(obj);
    let weak = zone.register_weak(obj).unwrap();

    assert_eq!(zone.collect(CollectionMode::Incremental), CollectionStatus::Ok);
    assert_eq!(zone.resolve_weak(weak), Some(obj));

    heap.unroot(obj);
    assert_eq!(zone.collect(CollectionMode::Incremental), CollectionStatus::Ok);
    assert_eq!(zone.resolve_weak(weak), None);
    assert_eq!(zone.collection_count(), 2);

    zone.unregister_weak(weak);
    assert!(zone.weak_refs().is_empty());
}

#[test]
fn test_cycles_without_roots_are_collected() {
    let heap = ToyHeap::new();
    let zone = Zone::with_config(ZoneConfig::single_threaded(), heap.collector()).unwrap();

    let a = heap.alloc(&zone);
    let b = heap.alloc(&zone);
    heap.link(a, b);
    heap.link(b, a);

    assert_eq!(zone.collect(CollectionMode::Full), CollectionStatus::Ok);
    assert_eq!(heap.object_count(), 0);
    assert!(zone.allocated().is_empty());
}

#[test]
fn test_dangling_root_reports_resurrection() {
    let heap = ToyHeap::new();
    let sink = Arc::new(RecordingSink::new());
    let zone = Zone::with_environment(
        ZoneConfig::single_threaded(),
        heap.collector(),
        Arc::new(AuxZone::new()),
        sink.clone(),
    )
    .unwrap();

    let obj = heap.alloc(&zone);
    assert_eq!(zone.collect(CollectionMode::Full), CollectionStatus::Ok);
    assert!(!heap.is_live(obj));

    heap.root(obj);
    assert_eq!(zone.collect(CollectionMode::Full), CollectionStatus::Error);
    let reports = sink.take();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].kind, ErrorKind::Resurrection);
    assert_eq!(reports[0].address, Some(obj));
    assert_eq!(zone.collection_count(), 1);
}

#[test]
fn test_initial_refcount_follows_config() {
    let heap = ToyHeap::new();
    let config = ZoneConfig {
        initial_refcount_to_one: true,
        ..ZoneConfig::single_threaded()
    };
    let zone = Zone::with_config(config, heap.collector()).unwrap();
    let obj = heap.alloc(&zone);
    assert_eq!(zone.metadata().get(obj), Some(1));
}
