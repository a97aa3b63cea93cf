//! Mutator threads allocating and requesting collections concurrently

use collector::{CoordinatorState, Zone, ZoneConfig};
use core_types::{Address, CollectionMode, CollectionStatus};
use integration_tests::ToyHeap;
use std::thread;

#[test]
fn test_rooted_objects_survive_concurrent_collections() {
    let heap = ToyHeap::new();
    let zone = Zone::with_config(ZoneConfig::default(), heap.collector()).unwrap();

    let rooted: Vec<Vec<Address>> = thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let (heap, zone) = (&heap, &zone);
                s.spawn(move || {
                    let mut kept = Vec::new();
                    for i in 0..200 {
                        if i % 2 == 0 {
                            kept.push(heap.alloc_rooted(zone));
                        } else {
                            heap.alloc(zone);
                        }
                        if i % 50 == 0 {
                            zone.request_collection(CollectionMode::Incremental);
                        }
                    }
                    kept
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert_eq!(zone.collect(CollectionMode::Full), CollectionStatus::Ok);
    zone.wait_for_idle();
    assert_eq!(zone.coordinator_state(), CoordinatorState::Idle);

    let rooted: Vec<Address> = rooted.into_iter().flatten().collect();
    assert_eq!(rooted.len(), 400);
    assert!(rooted.iter().all(|obj| heap.is_live(*obj)));
    assert_eq!(heap.object_count(), 400);
    assert_eq!(zone.allocated().len(), 400);
}

#[test]
fn test_weak_handles_from_many_threads_track_sweeps() {
    let heap = ToyHeap::new();
    let zone = Zone::with_config(ZoneConfig::default(), heap.collector()).unwrap();

    let handles = thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|t| {
                let (heap, zone) = (&heap, &zone);
                s.spawn(move || {
                    let _scope = zone.disable_scope();
                    (0..100)
                        .map(|i| {
                            let keep = (t + i) % 3 == 0;
                            let obj = if keep {
                                heap.alloc_rooted(zone)
                            } else {
                                heap.alloc(zone)
                            };
                            (zone.register_weak(obj).unwrap(), obj, keep)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert!(zone.is_collection_enabled());
    assert_eq!(zone.collect(CollectionMode::Exhaustive), CollectionStatus::Ok);
    for (handle, obj, keep) in handles {
        let expected = keep.then_some(obj);
        assert_eq!(zone.resolve_weak(handle), expected);
    }
}
