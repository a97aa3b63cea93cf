//! Auxiliary allocator accounting

use collector::aux_alloc::{aux_init, round_page, AuxZone, PAGE_SIZE};
use core_types::AuxError;
use std::sync::Arc;

#[test]
fn test_aux_init_returns_the_same_zone() {
    assert!(Arc::ptr_eq(&aux_init(), &aux_init()));
}

#[test]
fn test_valloc_is_page_aligned_and_rounded() {
    let zone = AuxZone::new();
    let block = zone.valloc(100).unwrap();
    assert_eq!(block.as_ptr() as usize % PAGE_SIZE, 0);
    unsafe {
        assert_eq!(zone.block_size(block), round_page(100));
        zone.free(block);
    }
    assert_eq!(zone.bytes_in_use(), 0);
}

#[test]
fn test_calloc_overflow_is_invalid_layout() {
    let zone = AuxZone::new();
    assert_eq!(
        zone.calloc(usize::MAX, 2),
        Err(AuxError::InvalidLayout {
            count: usize::MAX,
            size: 2
        })
    );
}

#[test]
fn test_limit_is_enforced_and_released() {
    let zone = AuxZone::with_limit(1024);
    let a = zone.malloc(768).unwrap();
    assert!(matches!(zone.malloc(512), Err(AuxError::Exhausted { .. })));
    unsafe { zone.free(a) };
    let b = zone.malloc(512).unwrap();
    unsafe { zone.free(b) };
    assert_eq!(zone.live_blocks(), 0);
}

#[test]
fn test_concurrent_alloc_free_balances() {
    let zone = AuxZone::new();
    std::thread::scope(|s| {
        for t in 1..=4 {
            let zone = &zone;
            s.spawn(move || {
                for i in 0..200 {
                    let block = zone.malloc(t * 8 + i).unwrap();
                    unsafe { zone.free(block) };
                }
            });
        }
    });
    assert_eq!(zone.bytes_in_use(), 0);
    assert_eq!(zone.allocation_count(), 800);
}
